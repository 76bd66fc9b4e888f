use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::anyhow;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::AppResult;

use super::msg::{self, PlayerId, ServerMessage};

/// Sending half of a connection's outbound queue. Frames are already encoded.
pub type Outbox = mpsc::Sender<Arc<str>>;

/// Live connections keyed by the id they were given on arrival.
#[derive(Debug, Default)]
pub struct Registry {
    last_player: AtomicU64,
    connections: Mutex<HashMap<PlayerId, Outbox>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, outbox: Outbox) -> PlayerId {
        let id = PlayerId::issue(self.last_player.fetch_add(1, Ordering::Relaxed) + 1);
        self.connections.lock().insert(id.clone(), outbox);
        id
    }

    pub fn unregister(&self, player: &PlayerId) -> bool {
        self.connections.lock().remove(player).is_some()
    }

    pub fn is_connected(&self, player: &PlayerId) -> bool {
        self.connections.lock().contains_key(player)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn send(&self, player: &PlayerId, message: &ServerMessage) -> AppResult<()> {
        let frame: Arc<str> = msg::encode(message)?.into();
        self.send_frame(player, frame)
    }

    /// Queues an encoded frame without waiting. A full or closed queue is an error, never a stall.
    pub fn send_frame(&self, player: &PlayerId, frame: Arc<str>) -> AppResult<()> {
        let connections = self.connections.lock();
        let outbox = connections
            .get(player)
            .ok_or_else(|| anyhow!("player {player} is not connected"))?;

        outbox.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => anyhow!("outbound queue for player {player} is full"),
            TrySendError::Closed(_) => anyhow!("connection for player {player} is closed"),
        })?;
        Ok(())
    }
}
