//! Room lookup endpoint. Lets a client check a code before opening a
//! WebSocket.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::SyncError;
use crate::frame::ErrorCode;
use crate::state::AppState;

pub async fn get_room(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.registry.summary(&code).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => error_response(&e),
    }
}

pub(crate) fn error_to_status(err: &SyncError) -> StatusCode {
    match err {
        SyncError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        SyncError::RoomNotFound(_) => StatusCode::NOT_FOUND,
        SyncError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        SyncError::Disconnected(_) | SyncError::RoomHalted(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(err: &SyncError) -> Response {
    let body = json!({ "code": err.error_code(), "message": err.to_string() });
    (error_to_status(err), Json(body)).into_response()
}
