//! WebSocket route: adapts axum's socket to the gateway `Transport`.

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::frame::Envelope;
use crate::gateway::{self, Inbound, Transport};
use crate::state::AppState;

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        info!("ws: client connected");
        gateway::run_session(state, WsTransport { socket }).await;
        info!("ws: client disconnected");
    })
}

pub struct WsTransport {
    socket: WebSocket,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), SyncError> {
        let json = serde_json::to_string(envelope).map_err(|e| {
            warn!(error = %e, "ws: failed to serialize envelope");
            SyncError::Disconnected(format!("serialize: {e}"))
        })?;
        self.socket
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| SyncError::Disconnected(e.to_string()))
    }

    async fn recv(&mut self) -> Inbound {
        match self.socket.recv().await {
            None | Some(Ok(Message::Close(_))) => Inbound::Closed,
            Some(Err(e)) => Inbound::Failed(e.to_string()),
            Some(Ok(Message::Text(text))) => Inbound::Text(text.as_str().to_owned()),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => Inbound::Heartbeat,
        }
    }
}
