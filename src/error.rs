//! Error taxonomy shared by the registry, rooms, and the session gateway.
//!
//! DESIGN
//! ======
//! Every error is local to the connection that caused it. The gateway turns
//! a `SyncError` into an `error` envelope for the originating client only;
//! nothing here is ever broadcast to other participants.

use crate::frame::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("unauthorized: connection is bound to room {bound}, event targets {target:?}")]
    Unauthorized { bound: String, target: String },
    #[error("disconnected: {0}")]
    Disconnected(String),
    #[error("room {0} halted after an internal inconsistency")]
    RoomHalted(String),
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "E_VALIDATION_FAILED",
            Self::RoomNotFound(_) => "E_ROOM_NOT_FOUND",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::Disconnected(_) => "E_DISCONNECTED",
            Self::RoomHalted(_) => "E_ROOM_HALTED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SyncError::validation("x").error_code(), "E_VALIDATION_FAILED");
        assert_eq!(SyncError::RoomNotFound("ABC123".into()).error_code(), "E_ROOM_NOT_FOUND");
        assert_eq!(
            SyncError::Unauthorized { bound: "ABC123".into(), target: "ZZZ999".into() }.error_code(),
            "E_UNAUTHORIZED"
        );
        assert_eq!(SyncError::Disconnected("eof".into()).error_code(), "E_DISCONNECTED");
        assert_eq!(SyncError::RoomHalted("ABC123".into()).error_code(), "E_ROOM_HALTED");
    }

    #[test]
    fn nothing_is_retryable() {
        assert!(!SyncError::Disconnected("eof".into()).retryable());
        assert!(!SyncError::validation("bad").retryable());
    }
}
