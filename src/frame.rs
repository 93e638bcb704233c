//! Envelope: the universal message shape between a client and the gateway.
//!
//! ARCHITECTURE
//! ============
//! Every message on the wire, in either direction, is an `Envelope`. Clients
//! send mutation envelopes (`draw`, `chat`, `task`, ...) and control
//! envelopes (`create`, `join`, `leave`, `ping`). The gateway answers with
//! `session`, `snapshot`, `error`, and `pong`, and forwards replicated
//! events, which are the only envelopes that carry a `seq`.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always a JSON object keyed by kind-specific fields.
//! - Field names are camelCase on the wire to match the browser client.
//! - The gateway routes on `type` and leaves `data` to the payload parsers.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::services::event_log::EventKind;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Envelope data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Envelope data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Envelope data key for the retryable flag on error envelopes.
pub const FRAME_RETRYABLE: &str = "retryable";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// Discriminator carried in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Draw,
    Clear,
    Chat,
    File,
    Task,
    Notes,
    Timer,
    Media,
    Presence,
    Create,
    Join,
    Leave,
    Ping,
    Pong,
    Session,
    Snapshot,
    Error,
}

impl MessageType {
    /// The event-log kind for mutation messages, `None` for control messages.
    #[must_use]
    pub fn event_kind(self) -> Option<EventKind> {
        match self {
            Self::Draw => Some(EventKind::Draw),
            Self::Clear => Some(EventKind::Clear),
            Self::Chat => Some(EventKind::Chat),
            Self::File => Some(EventKind::File),
            Self::Task => Some(EventKind::Task),
            Self::Notes => Some(EventKind::Notes),
            Self::Timer => Some(EventKind::Timer),
            Self::Media => Some(EventKind::Media),
            Self::Presence => Some(EventKind::Presence),
            Self::Create | Self::Join | Self::Leave | Self::Ping | Self::Pong | Self::Session | Self::Snapshot
            | Self::Error => None,
        }
    }
}

impl From<EventKind> for MessageType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Draw => Self::Draw,
            EventKind::Clear => Self::Clear,
            EventKind::Chat => Self::Chat,
            EventKind::File => Self::File,
            EventKind::Task => Self::Task,
            EventKind::Notes => Self::Notes,
            EventKind::Timer => Self::Timer,
            EventKind::Media => Self::Media,
            EventKind::Presence => Self::Presence,
        }
    }
}

/// The universal message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub room_code: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub data: Data,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    #[serde(default)]
    pub timestamp: i64,
    /// Log position. Present only on replicated events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error envelopes.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Envelope {
    pub fn new(kind: MessageType, data: Data) -> Self {
        Self {
            kind,
            room_code: String::new(),
            user_id: String::new(),
            user_name: String::new(),
            data,
            timestamp: now_ms(),
            seq: None,
        }
    }

    /// Structured error addressed to a single connection.
    #[must_use]
    pub fn error_from(room_code: &str, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::new(MessageType::Error, Data::new())
            .with_room(room_code)
            .with_data(FRAME_CODE, err.error_code())
            .with_data(FRAME_MESSAGE, err.to_string())
            .with_data(FRAME_RETRYABLE, err.retryable())
    }

    /// Build an envelope whose `data` is the serialized form of `payload`.
    /// Non-object payloads are stored under a `value` key.
    pub fn with_payload(kind: MessageType, payload: &impl Serialize) -> Self {
        let data = match serde_json::to_value(payload) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(other) => {
                let mut map = Data::new();
                map.insert("value".into(), other);
                map
            }
            Err(_) => Data::new(),
        };
        Self::new(kind, data)
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Envelope {
    #[must_use]
    pub fn with_room(mut self, room_code: impl Into<String>) -> Self {
        self.room_code = room_code.into();
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.user_name = user_name.into();
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl Envelope {
    /// Look up a string field in `data`.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Deserialize the whole `data` object into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error when `data` does not match `T`.
    pub fn decode_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.data.clone()))
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
