pub mod appresult;
pub mod config;
pub mod rooms;

use std::sync::Arc;

use axum::{Router, extract::FromRef};
use tower_http::trace::TraceLayer;

pub use appresult::{AppError, AppResult};
use config::RelayConfig;
use rooms::Relay;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            relay: Arc::new(Relay::new(config)),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(rooms::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
