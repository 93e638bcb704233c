//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the WebSocket session endpoint, the room lookup
//! API, and a health check. CORS is open because classroom clients are
//! served from arbitrary origins.

pub mod rooms;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/api/rooms/{code}", get(rooms::get_room))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
