//! Request dispatch and fan-out.
//!
//! One [`Relay`] owns the connection registry and the room table. Each inbound
//! request is handled entirely under the room table lock, including every send
//! it triggers, so a join can never interleave with a broadcast. Sends only
//! enqueue onto per-connection buffers, so holding the lock never waits on the
//! network.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;

use super::{
    msg::{self, ClientMessage, PlayerId, RoomId, ServerMessage},
    registry::{Outbox, Registry},
    room::{Departure, Rejection, RoomTable},
};

pub struct Relay {
    config: RelayConfig,
    registry: Registry,
    rooms: Mutex<RoomTable>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            rooms: Mutex::new(RoomTable::new(config.host_leave)),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Registers a new connection and tells it who it is.
    pub fn connect(&self, outbox: Outbox) -> PlayerId {
        let player = self.registry.register(outbox);
        info!(player = %player, "client connected");
        self.deliver(
            &player,
            &ServerMessage::AssignIdMessage {
                player_id: player.clone(),
            },
        );
        player
    }

    /// Pulls the player out of its room, tells whoever is left, then forgets the connection.
    pub fn disconnect(&self, player: &PlayerId) {
        {
            let mut rooms = self.rooms.lock();
            if let Some(departure) = rooms.leave(player) {
                self.announce(&departure);
            }
        }
        self.registry.unregister(player);
        info!(player = %player, "client disconnected");
    }

    /// Decodes one inbound frame and dispatches it. Garbage is logged and dropped.
    pub fn handle_frame(&self, sender: &PlayerId, frame: &[u8]) {
        match msg::decode(frame) {
            Ok(request) => self.dispatch(sender, request),
            Err(err) => warn!(
                player = %sender,
                error = %err,
                frame = %String::from_utf8_lossy(frame),
                "discarding malformed message"
            ),
        }
    }

    pub fn dispatch(&self, sender: &PlayerId, request: ClientMessage) {
        let kind = request.kind();
        if let Some(claimed) = request.player_id().filter(|claimed| *claimed != sender) {
            debug!(player = %sender, claimed = %claimed, kind, "ignoring claimed player id");
        }
        debug!(player = %sender, kind, "dispatching request");

        let mut rooms = self.rooms.lock();
        let outcome = match request {
            ClientMessage::CreateRoomRequest { .. } => {
                self.create_room(&mut rooms, sender);
                Ok(())
            }
            ClientMessage::JoinRoomRequest { room_id, name, .. } => {
                self.join_room(&mut rooms, sender, room_id, name)
            }
            ClientMessage::StartGameRequest { data, .. } => self.start_game(&mut rooms, sender, data),
            ClientMessage::PlacedTileRequest { data, .. } => {
                self.relay_turn(&rooms, sender, &ServerMessage::PlacedTileResponse { data })
            }
            ClientMessage::EndTurnRequest { data, .. } => {
                self.relay_turn(&rooms, sender, &ServerMessage::EndTurnResponse { data })
            }
        };

        if let Err(rejection) = outcome {
            self.reject(sender, kind, &rejection);
        }
    }

    pub fn room_of(&self, player: &PlayerId) -> Option<RoomId> {
        self.rooms.lock().room_of(player).ok().map(|room| room.id().clone())
    }

    pub fn room_members(&self, room: &RoomId) -> Option<Vec<PlayerId>> {
        self.rooms
            .lock()
            .room(room)
            .map(|room| room.members().iter().map(|m| m.id.clone()).collect())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().room_count()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    fn create_room(&self, rooms: &mut RoomTable, sender: &PlayerId) {
        let (room, departed) = rooms.create(sender.clone());
        if let Some(departure) = departed {
            self.announce(&departure);
        }

        info!(player = %sender, room = %room, "room created");
        self.deliver(sender, &ServerMessage::CreateRoomResponse { room });
    }

    fn join_room(
        &self,
        rooms: &mut RoomTable,
        sender: &PlayerId,
        room: Option<RoomId>,
        name: String,
    ) -> Result<(), Rejection> {
        let room = room.ok_or(Rejection::MissingRoomId)?;
        let joined = rooms.join(&room, sender.clone(), name.clone())?;
        if let Some(departure) = &joined.departed {
            self.announce(departure);
        }

        info!(player = %sender, room = %room, index = joined.index, "player joined");
        self.deliver(&joined.host, &ServerMessage::JoinRoomHostResponse { name });
        self.deliver(
            sender,
            &ServerMessage::JoinRoomPlayerResponse {
                index: joined.index,
            },
        );
        Ok(())
    }

    fn start_game(&self, rooms: &mut RoomTable, sender: &PlayerId, data: Option<Value>) -> Result<(), Rejection> {
        let room = rooms.start(sender)?;
        info!(
            room = %room.id(),
            status = ?room.status(),
            players = room.members().len(),
            "game started"
        );
        self.fan_out(room.guests(), &ServerMessage::StartGameResponse { data });
        Ok(())
    }

    fn relay_turn(&self, rooms: &RoomTable, sender: &PlayerId, message: &ServerMessage) -> Result<(), Rejection> {
        let room = rooms.room_of(sender)?;
        self.fan_out(room.others(sender), message);
        Ok(())
    }

    fn announce(&self, departure: &Departure) {
        match departure {
            Departure::Left {
                room,
                index,
                name,
                remaining,
            } => {
                info!(room = %room, index, name = %name, "player left room");
                self.fan_out(remaining, &ServerMessage::PlayerLeftResponse { index: *index });
            }
            Departure::Promoted { room, remaining } => {
                self.fan_out(remaining, &ServerMessage::PlayerLeftResponse { index: 0 });
                if let Some(host) = remaining.first() {
                    info!(room = %room, host = %host, "host left, promoted next player");
                    self.deliver(host, &ServerMessage::HostAssignedResponse { room: room.clone() });
                }
            }
            Departure::Closed { room, evicted } => {
                info!(room = %room, evicted = evicted.len(), "host left, room closed");
                self.fan_out(evicted, &ServerMessage::RoomClosedResponse { room: room.clone() });
            }
            Departure::Emptied { room } => info!(room = %room, "room emptied"),
        }
    }

    fn reject(&self, sender: &PlayerId, kind: &'static str, rejection: &Rejection) {
        warn!(player = %sender, kind, reason = %rejection, "request rejected");
        if self.config.reject_invalid {
            self.deliver(
                sender,
                &ServerMessage::ErrorResponse {
                    request: kind.to_owned(),
                    reason: rejection.to_string(),
                },
            );
        }
    }

    fn deliver(&self, player: &PlayerId, message: &ServerMessage) {
        if let Err(err) = self.registry.send(player, message) {
            warn!(player = %player, error = %err, "dropping outbound message");
        }
    }

    /// Encodes once, queues to every recipient, and returns how many queues took it.
    fn fan_out<'a>(&self, recipients: impl IntoIterator<Item = &'a PlayerId>, message: &ServerMessage) -> usize {
        let frame: Arc<str> = match msg::encode(message) {
            Ok(frame) => frame.into(),
            Err(err) => {
                warn!(error = %err, "failed to encode outbound message");
                return 0;
            }
        };

        let mut delivered = 0;
        for player in recipients {
            match self.registry.send_frame(player, Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(err) => warn!(player = %player, error = %err, "dropping outbound message"),
            }
        }
        debug!(delivered, "fanned out message");
        delivered
    }
}
