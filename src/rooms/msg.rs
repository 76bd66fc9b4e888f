use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::AppResult;

/// Token handed to a connection when it arrives. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

/// Token naming a room. Issued from its own counter, separate from [`PlayerId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

macro_rules! token_impl {
    ($T:ty) => {
        impl $T {
            pub(crate) fn issue(n: u64) -> Self {
                Self(n.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

token_impl!(PlayerId);
token_impl!(RoomId);

/// Everything a client may send. `playerId` is carried for compatibility with
/// existing clients; the relay trusts the connection's own id instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoomRequest {
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    JoinRoomRequest {
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        name: String,
    },
    StartGameRequest {
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default, deserialize_with = "present")]
        data: Option<Value>,
    },
    PlacedTileRequest {
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default, deserialize_with = "present")]
        data: Option<Value>,
    },
    EndTurnRequest {
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default, deserialize_with = "present")]
        data: Option<Value>,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRoomRequest { .. } => "CreateRoomRequest",
            Self::JoinRoomRequest { .. } => "JoinRoomRequest",
            Self::StartGameRequest { .. } => "StartGameRequest",
            Self::PlacedTileRequest { .. } => "PlacedTileRequest",
            Self::EndTurnRequest { .. } => "EndTurnRequest",
        }
    }

    pub fn player_id(&self) -> Option<&PlayerId> {
        match self {
            Self::CreateRoomRequest { player_id }
            | Self::JoinRoomRequest { player_id, .. }
            | Self::StartGameRequest { player_id, .. }
            | Self::PlacedTileRequest { player_id, .. }
            | Self::EndTurnRequest { player_id, .. } => player_id.as_ref(),
        }
    }
}

/// Everything the relay sends back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AssignIdMessage { player_id: PlayerId },
    CreateRoomResponse { room: RoomId },
    /// Host only.
    JoinRoomHostResponse { name: String },
    /// Joiner only.
    JoinRoomPlayerResponse { index: usize },
    StartGameResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    PlacedTileResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    EndTurnResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// The member at `index` is gone; everyone after it moves down one.
    PlayerLeftResponse { index: usize },
    HostAssignedResponse { room: RoomId },
    RoomClosedResponse { room: RoomId },
    ErrorResponse { request: String, reason: String },
}

/// Keeps an explicit `null` apart from a missing field, which `default` turns into `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

pub fn decode(frame: &[u8]) -> AppResult<ClientMessage> {
    Ok(serde_json::from_slice(frame)?)
}

pub fn encode(message: &ServerMessage) -> AppResult<String> {
    Ok(serde_json::to_string(message)?)
}
