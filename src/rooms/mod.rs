mod registry;
mod relay;
mod room;
mod ws;

pub mod msg;

use std::sync::Arc;

use axum::{Json, Router, debug_handler, extract::State, routing::get};
use serde::Serialize;

pub use registry::{Outbox, Registry};
pub use relay::Relay;
pub use room::{Departure, Joined, Member, Rejection, Room, RoomStatus, RoomTable};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(ws::relay_ws))
        .route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub(crate) struct Health {
    status: &'static str,
    connections: usize,
    rooms: usize,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn health(State(relay): State<Arc<Relay>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        connections: relay.connection_count(),
        rooms: relay.room_count(),
    })
}
