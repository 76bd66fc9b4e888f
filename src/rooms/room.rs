use std::collections::HashMap;

use thiserror::Error;

use crate::config::HostLeavePolicy;

use super::msg::{PlayerId, RoomId};

/// Why a request was turned away. Never fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("room {0} does not exist")]
    UnknownRoom(RoomId),
    #[error("no room id given")]
    MissingRoomId,
    #[error("already a member of room {0}")]
    AlreadyMember(RoomId),
    #[error("not in a room")]
    NoRoom,
    #[error("only the host of room {0} can start the game")]
    NotHost(RoomId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: PlayerId,
    /// Empty for the host, who never announces a name.
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Open,
    InProgress,
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    members: Vec<Member>,
    status: RoomStatus,
}

impl Room {
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// In join order. Index 0 is the host.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn host(&self) -> Option<&PlayerId> {
        self.members.first().map(|m| &m.id)
    }

    pub fn is_host(&self, player: &PlayerId) -> bool {
        self.host() == Some(player)
    }

    /// Everyone but the host.
    pub fn guests(&self) -> impl Iterator<Item = &PlayerId> {
        self.members.iter().skip(1).map(|m| &m.id)
    }

    /// Everyone but `sender`.
    pub fn others<'a>(&'a self, sender: &'a PlayerId) -> impl Iterator<Item = &'a PlayerId> {
        self.members.iter().map(|m| &m.id).filter(move |id| *id != sender)
    }

    fn position(&self, player: &PlayerId) -> Option<usize> {
        self.members.iter().position(|m| &m.id == player)
    }

    fn member_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }
}

/// Who has to be told after a player left its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// A guest left; `remaining` is still in join order.
    Left {
        room: RoomId,
        index: usize,
        name: String,
        remaining: Vec<PlayerId>,
    },
    /// The host left and `remaining[0]` took over.
    Promoted {
        room: RoomId,
        remaining: Vec<PlayerId>,
    },
    /// The host left and the room went with it.
    Closed { room: RoomId, evicted: Vec<PlayerId> },
    /// Last one out; the room is gone.
    Emptied { room: RoomId },
}

#[derive(Debug)]
pub struct Joined {
    pub index: usize,
    pub host: PlayerId,
    /// Set when the player had to leave another room first.
    pub departed: Option<Departure>,
}

/// Room membership plus the reverse player index, kept consistent with each other.
#[derive(Debug, Default)]
pub struct RoomTable {
    policy: HostLeavePolicy,
    last_room: u64,
    rooms: HashMap<RoomId, Room>,
    player_rooms: HashMap<PlayerId, RoomId>,
}

impl RoomTable {
    pub fn new(policy: HostLeavePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn room(&self, room: &RoomId) -> Option<&Room> {
        self.rooms.get(room)
    }

    pub fn room_of(&self, player: &PlayerId) -> Result<&Room, Rejection> {
        self.player_rooms
            .get(player)
            .and_then(|room| self.rooms.get(room))
            .ok_or(Rejection::NoRoom)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Opens a fresh room hosted by `host`, pulling it out of any room it was already in.
    pub fn create(&mut self, host: PlayerId) -> (RoomId, Option<Departure>) {
        let departed = self.leave(&host);

        self.last_room += 1;
        let id = RoomId::issue(self.last_room);
        self.player_rooms.insert(host.clone(), id.clone());
        self.rooms.insert(
            id.clone(),
            Room {
                id: id.clone(),
                members: vec![Member {
                    id: host,
                    name: String::new(),
                }],
                status: RoomStatus::Open,
            },
        );

        (id, departed)
    }

    /// Appends `player` to `room`. Nothing changes unless the join succeeds.
    pub fn join(&mut self, room: &RoomId, player: PlayerId, name: String) -> Result<Joined, Rejection> {
        // Rooms are dropped the moment they empty out, so a known room always has a host.
        let target = self
            .rooms
            .get(room)
            .ok_or_else(|| Rejection::UnknownRoom(room.clone()))?;
        let host = target
            .host()
            .cloned()
            .ok_or_else(|| Rejection::UnknownRoom(room.clone()))?;
        if target.position(&player).is_some() {
            return Err(Rejection::AlreadyMember(room.clone()));
        }

        let departed = self.leave(&player);

        let target = self
            .rooms
            .get_mut(room)
            .ok_or_else(|| Rejection::UnknownRoom(room.clone()))?;
        target.members.push(Member {
            id: player.clone(),
            name,
        });
        let index = target.members.len() - 1;
        self.player_rooms.insert(player, room.clone());

        Ok(Joined {
            index,
            host,
            departed,
        })
    }

    /// Marks the sender's room as started. Only its host may do that.
    pub fn start(&mut self, player: &PlayerId) -> Result<&Room, Rejection> {
        let room = self
            .player_rooms
            .get(player)
            .and_then(|room| self.rooms.get_mut(room))
            .ok_or(Rejection::NoRoom)?;
        if !room.is_host(player) {
            return Err(Rejection::NotHost(room.id.clone()));
        }

        room.status = RoomStatus::InProgress;
        Ok(room)
    }

    pub fn leave(&mut self, player: &PlayerId) -> Option<Departure> {
        let room_id = self.player_rooms.remove(player)?;
        let room = self.rooms.get_mut(&room_id)?;
        let index = room.position(player)?;
        let gone = room.members.remove(index);

        if room.members.is_empty() {
            self.rooms.remove(&room_id);
            return Some(Departure::Emptied { room: room_id });
        }

        let remaining = room.member_ids();
        if index > 0 {
            return Some(Departure::Left {
                room: room_id,
                index,
                name: gone.name,
                remaining,
            });
        }

        match self.policy {
            HostLeavePolicy::Promote => Some(Departure::Promoted {
                room: room_id,
                remaining,
            }),
            HostLeavePolicy::Close => {
                self.rooms.remove(&room_id);
                for id in &remaining {
                    self.player_rooms.remove(id);
                }
                Some(Departure::Closed {
                    room: room_id,
                    evicted: remaining,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> PlayerId {
        PlayerId::from(id)
    }

    fn ids(room: &Room) -> Vec<&str> {
        room.members().iter().map(|m| m.id.as_str()).collect()
    }

    fn assert_consistent(table: &RoomTable) {
        for (player, room) in &table.player_rooms {
            let room = table
                .rooms
                .get(room)
                .unwrap_or_else(|| panic!("{player} points at missing room {room}"));
            assert!(room.position(player).is_some(), "{player} not listed in {}", room.id);
        }
        for room in table.rooms.values() {
            assert!(!room.members.is_empty(), "room {} kept while empty", room.id);
            for (i, member) in room.members.iter().enumerate() {
                assert_eq!(table.player_rooms.get(&member.id), Some(&room.id));
                assert_eq!(room.position(&member.id), Some(i), "duplicate {}", member.id);
            }
        }
    }

    #[test]
    fn room_ids_count_up_from_one() {
        let mut table = RoomTable::default();
        assert_eq!(table.create(p("1")).0, RoomId::from("1"));
        assert_eq!(table.create(p("2")).0, RoomId::from("2"));
        assert_eq!(table.room_count(), 2);
    }

    #[test]
    fn joins_get_sequential_indices_and_host_stays_first() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));

        for (n, player) in ["2", "3", "4"].into_iter().enumerate() {
            let joined = table.join(&room, p(player), format!("player {player}")).unwrap();
            assert_eq!(joined.index, n + 1);
            assert_eq!(joined.host, p("1"));
            assert!(joined.departed.is_none());
        }

        let room = table.room(&room).unwrap();
        assert_eq!(ids(room), ["1", "2", "3", "4"]);
        assert_eq!(room.members()[2].name, "player 3");
        assert!(room.is_host(&p("1")));
        assert_consistent(&table);
    }

    #[test]
    fn joining_unknown_room_changes_nothing() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));

        let err = table.join(&RoomId::from("99"), p("2"), "Bob".into()).unwrap_err();
        assert_eq!(err, Rejection::UnknownRoom(RoomId::from("99")));
        assert_eq!(table.room_of(&p("2")).unwrap_err(), Rejection::NoRoom);
        assert_eq!(ids(table.room(&room).unwrap()), ["1"]);
    }

    #[test]
    fn failed_join_keeps_current_room() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));
        table.join(&room, p("2"), "Bob".into()).unwrap();

        table.join(&RoomId::from("99"), p("2"), "Bob".into()).unwrap_err();
        assert_eq!(table.room_of(&p("2")).unwrap().id(), &room);
        assert_consistent(&table);
    }

    #[test]
    fn joining_twice_is_refused() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));
        table.join(&room, p("2"), "Bob".into()).unwrap();

        assert_eq!(
            table.join(&room, p("2"), "Bob".into()).unwrap_err(),
            Rejection::AlreadyMember(room.clone())
        );
        assert_eq!(
            table.join(&room, p("1"), "Host".into()).unwrap_err(),
            Rejection::AlreadyMember(room.clone())
        );
        assert_eq!(ids(table.room(&room).unwrap()), ["1", "2"]);
    }

    #[test]
    fn only_the_host_starts() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));
        table.join(&room, p("2"), "Bob".into()).unwrap();

        assert_eq!(table.start(&p("2")).unwrap_err(), Rejection::NotHost(room.clone()));
        assert_eq!(table.start(&p("3")).unwrap_err(), Rejection::NoRoom);
        assert_eq!(table.room(&room).unwrap().status(), RoomStatus::Open);

        let started = table.start(&p("1")).unwrap();
        assert_eq!(started.status(), RoomStatus::InProgress);
        assert_eq!(started.guests().map(PlayerId::as_str).collect::<Vec<_>>(), ["2"]);
    }

    #[test]
    fn others_skips_only_the_sender() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));
        table.join(&room, p("2"), "Bob".into()).unwrap();
        table.join(&room, p("3"), "Cat".into()).unwrap();

        let room = table.room(&room).unwrap();
        let sender = p("2");
        let others: Vec<_> = room.others(&sender).map(PlayerId::as_str).collect();
        assert_eq!(others, ["1", "3"]);
    }

    #[test]
    fn guest_leaving_shifts_later_members() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));
        table.join(&room, p("2"), "Bob".into()).unwrap();
        table.join(&room, p("3"), "Cat".into()).unwrap();

        assert_eq!(
            table.leave(&p("2")),
            Some(Departure::Left {
                room: room.clone(),
                index: 1,
                name: "Bob".into(),
                remaining: vec![p("1"), p("3")],
            })
        );
        assert_eq!(ids(table.room(&room).unwrap()), ["1", "3"]);
        assert_eq!(table.leave(&p("2")), None);
        assert_consistent(&table);
    }

    #[test]
    fn host_leaving_closes_room_by_default() {
        let mut table = RoomTable::default();
        let (room, _) = table.create(p("1"));
        table.join(&room, p("2"), "Bob".into()).unwrap();
        table.join(&room, p("3"), "Cat".into()).unwrap();

        assert_eq!(
            table.leave(&p("1")),
            Some(Departure::Closed {
                room: room.clone(),
                evicted: vec![p("2"), p("3")],
            })
        );
        assert!(table.room(&room).is_none());
        assert_eq!(table.room_of(&p("2")).unwrap_err(), Rejection::NoRoom);
        assert_consistent(&table);
    }

    #[test]
    fn host_leaving_promotes_next_member() {
        let mut table = RoomTable::new(HostLeavePolicy::Promote);
        let (room, _) = table.create(p("1"));
        table.join(&room, p("2"), "Bob".into()).unwrap();
        table.join(&room, p("3"), "Cat".into()).unwrap();

        assert_eq!(
            table.leave(&p("1")),
            Some(Departure::Promoted {
                room: room.clone(),
                remaining: vec![p("2"), p("3")],
            })
        );
        assert!(table.room(&room).unwrap().is_host(&p("2")));
        assert!(table.start(&p("2")).is_ok());
        assert_consistent(&table);
    }

    #[test]
    fn last_member_out_removes_room() {
        let mut table = RoomTable::new(HostLeavePolicy::Promote);
        let (room, _) = table.create(p("1"));

        assert_eq!(table.leave(&p("1")), Some(Departure::Emptied { room: room.clone() }));
        assert_eq!(table.room_count(), 0);
        assert_eq!(
            table.join(&room, p("2"), "Bob".into()).unwrap_err(),
            Rejection::UnknownRoom(room)
        );
    }

    #[test]
    fn creating_again_leaves_previous_room() {
        let mut table = RoomTable::default();
        let (first, _) = table.create(p("1"));
        table.join(&first, p("2"), "Bob".into()).unwrap();

        let (second, departed) = table.create(p("2"));
        assert_eq!(
            departed,
            Some(Departure::Left {
                room: first.clone(),
                index: 1,
                name: "Bob".into(),
                remaining: vec![p("1")],
            })
        );
        assert_eq!(ids(table.room(&first).unwrap()), ["1"]);
        assert_eq!(ids(table.room(&second).unwrap()), ["2"]);
        assert_consistent(&table);
    }

    #[test]
    fn switching_rooms_by_joining() {
        let mut table = RoomTable::default();
        let (first, _) = table.create(p("1"));
        let (second, _) = table.create(p("2"));
        table.join(&first, p("3"), "Cat".into()).unwrap();

        let joined = table.join(&second, p("3"), "Cat".into()).unwrap();
        assert_eq!(joined.index, 1);
        assert_eq!(joined.host, p("2"));
        assert!(matches!(joined.departed, Some(Departure::Left { index: 1, .. })));
        assert_eq!(ids(table.room(&first).unwrap()), ["1"]);
        assert_consistent(&table);
    }
}
