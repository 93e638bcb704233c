//! Session gateway: one client connection bound to one room.
//!
//! DESIGN
//! ======
//! The gateway is transport-agnostic: it talks to a `Transport`, which the
//! WebSocket route implements over axum's socket and tests implement over
//! in-memory channels. A session is a small state machine:
//!
//! 1. Handshake: the first accepted envelope must be `create` or `join`.
//!    Failures are answered with an `error` envelope and the client may
//!    try again on the same connection.
//! 2. Bound: send `session`, then `snapshot`, then enter the duplex loop.
//!    Inbound mutations are stamped with the bound participant and
//!    submitted to the room; replicated events drain from the outbound
//!    queue in log order.
//! 3. Closed: transport close or failure, heartbeat timeout, `leave`, or
//!    the room dropping our queue. Every path detaches the participant.
//!
//! ERROR HANDLING
//! ==============
//! Errors are reported to this connection only. A mutation whose `roomCode`
//! is blank or names a different room than the one the connection is bound
//! to is rejected as `Unauthorized` and never reaches any room. Control
//! envelopes (`ping`, `pong`, `leave`) need no room code.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::frame::{Data, Envelope, FRAME_CODE, FRAME_MESSAGE, MessageType};
use crate::services::derived::Payload;
use crate::services::registry::{Admission, Registry};
use crate::services::roster::Participant;
use crate::state::AppState;

// =============================================================================
// TRANSPORT
// =============================================================================

/// One item read from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text message, expected to hold one JSON envelope.
    Text(String),
    /// Transport-level liveness traffic (ping/pong/binary frames).
    Heartbeat,
    /// Orderly close by the peer.
    Closed,
    Failed(String),
}

#[async_trait]
pub trait Transport: Send {
    /// Deliver one envelope to the client.
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` when the transport can no longer deliver.
    async fn send(&mut self, envelope: &Envelope) -> Result<(), SyncError>;

    /// Wait for the next inbound item. Must be cancel safe.
    async fn recv(&mut self) -> Inbound;
}

/// In-memory transport backed by two channels.
pub struct ChannelTransport {
    inbound: mpsc::Receiver<Inbound>,
    outbound: mpsc::Sender<Envelope>,
}

/// The client's half of a `ChannelTransport`.
pub struct ChannelClient {
    pub tx: mpsc::Sender<Inbound>,
    pub rx: mpsc::Receiver<Envelope>,
}

impl ChannelTransport {
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, ChannelClient) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        (Self { inbound: in_rx, outbound: out_tx }, ChannelClient { tx: in_tx, rx: out_rx })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), SyncError> {
        self.outbound
            .send(envelope.clone())
            .await
            .map_err(|_| SyncError::Disconnected("client channel closed".into()))
    }

    async fn recv(&mut self) -> Inbound {
        self.inbound.recv().await.unwrap_or(Inbound::Closed)
    }
}

// =============================================================================
// HANDSHAKE PAYLOADS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreateRequest {
    host_name: String,
    room_name: String,
    participant_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JoinRequest {
    room_code: String,
    user_name: String,
    participant_id: Option<String>,
}

enum Handshake {
    Bound(Admission),
    Retry(Option<Envelope>),
    Closed,
}

enum Flow {
    Continue(Option<Envelope>),
    Leave,
}

// =============================================================================
// SESSION
// =============================================================================

/// Drive one connection from handshake to detach.
pub async fn run_session(state: AppState, mut transport: impl Transport) {
    let heartbeat = state.config.heartbeat_timeout;

    let Some(mut admission) = handshake(&state.registry, &mut transport, heartbeat).await else {
        debug!("session closed before joining a room");
        return;
    };
    let participant = admission.participant.clone();
    let room_code = admission.snapshot.room_code.clone();
    info!(room = %room_code, participant = %participant.id, "session bound");

    let session = Envelope::with_payload(MessageType::Session, &admission.session())
        .with_room(&room_code)
        .with_user(&participant.id, &participant.display_name);
    let snapshot = Envelope::with_payload(MessageType::Snapshot, &admission.snapshot)
        .with_room(&room_code)
        .with_user(&participant.id, &participant.display_name);

    if deliver(&mut transport, &session, heartbeat).await && deliver(&mut transport, &snapshot, heartbeat).await {
        pump(&mut transport, &mut admission, &room_code, heartbeat).await;
    }

    let removed = admission.room.lock().await.remove_participant(&participant.id);
    info!(room = %room_code, participant = %participant.id, removed, "session closed");
}

async fn handshake(registry: &Registry, transport: &mut impl Transport, heartbeat: Duration) -> Option<Admission> {
    loop {
        let inbound = match tokio::time::timeout(heartbeat, transport.recv()).await {
            Ok(inbound) => inbound,
            Err(_) => {
                warn!("handshake heartbeat timeout");
                return None;
            }
        };
        let outcome = match inbound {
            Inbound::Text(text) => handle_handshake(registry, &text).await,
            Inbound::Heartbeat => Handshake::Retry(None),
            Inbound::Closed => Handshake::Closed,
            Inbound::Failed(e) => {
                warn!(error = %e, "transport failed during handshake");
                Handshake::Closed
            }
        };
        match outcome {
            Handshake::Bound(admission) => return Some(admission),
            Handshake::Retry(Some(reply)) => {
                if !deliver(transport, &reply, heartbeat).await {
                    return None;
                }
            }
            Handshake::Retry(None) => {}
            Handshake::Closed => return None,
        }
    }
}

async fn handle_handshake(registry: &Registry, text: &str) -> Handshake {
    let envelope = match parse_envelope(text) {
        Ok(envelope) => envelope,
        Err(e) => return Handshake::Retry(Some(Envelope::error_from("", &e))),
    };

    let result = match envelope.kind {
        MessageType::Create => match envelope.decode_data::<CreateRequest>() {
            Ok(req) => {
                registry
                    .create_room(&req.host_name, &req.room_name, req.participant_id.as_deref())
                    .await
            }
            Err(e) => Err(SyncError::validation(format!("invalid create payload: {e}"))),
        },
        MessageType::Join => match envelope.decode_data::<JoinRequest>() {
            Ok(req) => {
                let code = if req.room_code.trim().is_empty() {
                    envelope.room_code.as_str()
                } else {
                    req.room_code.as_str()
                };
                registry
                    .join_room(code, &req.user_name, req.participant_id.as_deref())
                    .await
            }
            Err(e) => Err(SyncError::validation(format!("invalid join payload: {e}"))),
        },
        MessageType::Ping => return Handshake::Retry(Some(Envelope::new(MessageType::Pong, Data::new()))),
        MessageType::Leave => return Handshake::Closed,
        other => Err(SyncError::validation(format!("{other:?} before create or join"))),
    };

    match result {
        Ok(admission) => Handshake::Bound(admission),
        Err(e) => {
            debug!(error = %e, "handshake rejected");
            Handshake::Retry(Some(Envelope::error_from(&envelope.room_code, &e)))
        }
    }
}

async fn pump(transport: &mut impl Transport, admission: &mut Admission, room_code: &str, heartbeat: Duration) {
    let participant = admission.participant.clone();
    let mut deadline = Instant::now() + heartbeat;

    loop {
        tokio::select! {
            inbound = transport.recv() => {
                match inbound {
                    Inbound::Text(text) => {
                        deadline = Instant::now() + heartbeat;
                        match handle_inbound(admission, &participant, room_code, &text).await {
                            Flow::Continue(Some(reply)) => {
                                if !deliver(transport, &reply, heartbeat).await {
                                    break;
                                }
                            }
                            Flow::Continue(None) => {}
                            Flow::Leave => {
                                info!(room = %room_code, participant = %participant.id, "participant left");
                                break;
                            }
                        }
                    }
                    Inbound::Heartbeat => deadline = Instant::now() + heartbeat,
                    Inbound::Closed => break,
                    Inbound::Failed(e) => {
                        warn!(room = %room_code, participant = %participant.id, error = %e, "transport failed");
                        break;
                    }
                }
            }
            outbound = admission.outbound.recv() => {
                let Some(envelope) = outbound else {
                    // The room dropped our queue: we lagged or the room was destroyed.
                    let err = SyncError::Disconnected("outbound queue closed".into());
                    let _ = deliver(transport, &Envelope::error_from(room_code, &err), heartbeat).await;
                    break;
                };
                if !deliver(transport, &envelope, heartbeat).await {
                    break;
                }
            }
            () = tokio::time::sleep_until(deadline) => {
                warn!(room = %room_code, participant = %participant.id, "heartbeat timeout");
                break;
            }
        }
    }
}

/// Route one inbound envelope from a bound connection.
async fn handle_inbound(admission: &Admission, participant: &Participant, room_code: &str, text: &str) -> Flow {
    match route_inbound(admission, participant, room_code, text).await {
        Ok(flow) => flow,
        Err(e) => Flow::Continue(Some(Envelope::error_from(room_code, &e))),
    }
}

async fn route_inbound(
    admission: &Admission,
    participant: &Participant,
    room_code: &str,
    text: &str,
) -> Result<Flow, SyncError> {
    let envelope = parse_envelope(text)?;

    let kind = match envelope.kind {
        MessageType::Ping => {
            let pong = Envelope::new(MessageType::Pong, Data::new()).with_room(room_code);
            return Ok(Flow::Continue(Some(pong)));
        }
        MessageType::Pong => return Ok(Flow::Continue(None)),
        MessageType::Leave => return Ok(Flow::Leave),
        MessageType::Create | MessageType::Join => {
            return Err(SyncError::validation("connection is already bound to a room"));
        }
        MessageType::Session | MessageType::Snapshot | MessageType::Error => {
            return Err(SyncError::validation(format!("{:?} is server-only", envelope.kind)));
        }
        other => other.event_kind().ok_or_else(|| SyncError::validation(format!("unsupported type {other:?}")))?,
    };

    // Mutations must name the bound room; a blank code matches nothing.
    let target = envelope.room_code.trim();
    if !target.eq_ignore_ascii_case(room_code) {
        warn!(room = %room_code, participant = %participant.id, target, "envelope for another room dropped");
        return Err(SyncError::Unauthorized { bound: room_code.to_owned(), target: target.to_owned() });
    }

    let payload = Payload::parse(kind, &envelope.data)?;
    let mut room = admission.room.lock().await;
    room.submit(participant, payload)?;
    Ok(Flow::Continue(None))
}

fn parse_envelope(text: &str) -> Result<Envelope, SyncError> {
    serde_json::from_str(text).map_err(|e| SyncError::validation(format!("invalid envelope: {e}")))
}

/// Send with a deadline. Returns `false` when the connection should close.
async fn deliver(transport: &mut impl Transport, envelope: &Envelope, timeout: Duration) -> bool {
    if envelope.kind == MessageType::Error {
        let code = envelope.data_str(FRAME_CODE).unwrap_or("-");
        let message = envelope.data_str(FRAME_MESSAGE).unwrap_or("-");
        warn!(room = %envelope.room_code, code, message, "send error envelope");
    }
    match tokio::time::timeout(timeout, transport.send(envelope)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "send failed");
            false
        }
        Err(_) => {
            warn!(room = %envelope.room_code, "send timed out");
            false
        }
    }
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
