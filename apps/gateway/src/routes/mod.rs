mod gateway;
mod mode;

use axum::{routing::get, Router};

use crate::app::AppState;

pub use mode::{Mode, ModeRequest, Params, StreamSource};

/// All dispatcher traffic is `GET /?mode=...`.
pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/", get(gateway::dispatch))
}
