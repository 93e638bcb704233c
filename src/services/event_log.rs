//! Event log: ordered, immutable history of room mutations.
//!
//! DESIGN
//! ======
//! The log is the serialization point of a room: `append` assigns the next
//! sequence number and is only ever called while the room's writer lock is
//! held, so two participants can never interleave mid-assignment. Sequence
//! numbers start at 1 and are gap-free.
//!
//! Retention is bounded by count. Trimming drops the oldest events only;
//! late joiners never replay the log (they receive a snapshot), so trimming
//! never affects convergence.
//!
//! ERROR HANDLING
//! ==============
//! A detected gap is an internal invariant violation. The log halts and
//! refuses every later append rather than serve an inconsistent history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::SyncError;
use crate::frame::{Envelope, MessageType, now_ms};
use crate::services::derived::Payload;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Draw,
    Clear,
    Chat,
    File,
    Task,
    Notes,
    Timer,
    Media,
    Presence,
}

/// A stamped, sequence-numbered mutation. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub seq: u64,
    pub room_code: String,
    pub origin: String,
    pub origin_name: String,
    pub payload: Payload,
    pub timestamp: i64,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl From<&Event> for Envelope {
    fn from(event: &Event) -> Self {
        let mut envelope = Envelope::new(MessageType::from(event.kind()), event.payload.to_data())
            .with_room(event.room_code.clone())
            .with_user(event.origin.clone(), event.origin_name.clone());
        envelope.timestamp = event.timestamp;
        envelope.seq = Some(event.seq);
        envelope
    }
}

impl TryFrom<&Envelope> for Event {
    type Error = SyncError;

    fn try_from(envelope: &Envelope) -> Result<Self, Self::Error> {
        let Some(seq) = envelope.seq else {
            return Err(SyncError::validation("replicated event is missing seq"));
        };
        let Some(kind) = envelope.kind.event_kind() else {
            return Err(SyncError::validation(format!("{:?} is not an event kind", envelope.kind)));
        };
        let payload = Payload::parse(kind, &envelope.data)?;
        Ok(Self {
            seq,
            room_code: envelope.room_code.clone(),
            origin: envelope.user_id.clone(),
            origin_name: envelope.user_name.clone(),
            payload,
            timestamp: envelope.timestamp,
        })
    }
}

// =============================================================================
// EVENT LOG
// =============================================================================

pub struct EventLog {
    room_code: String,
    events: VecDeque<Event>,
    last_seq: u64,
    retention: usize,
    halted: bool,
}

impl EventLog {
    #[must_use]
    pub fn new(room_code: impl Into<String>, retention: usize) -> Self {
        Self {
            room_code: room_code.into(),
            events: VecDeque::new(),
            last_seq: 0,
            retention: retention.max(1),
            halted: false,
        }
    }

    /// Append a payload, assigning the next sequence number.
    ///
    /// # Errors
    ///
    /// Returns `RoomHalted` once the log has detected a sequence gap.
    pub fn append(&mut self, payload: Payload, origin: &str, origin_name: &str) -> Result<Event, SyncError> {
        if self.halted {
            return Err(SyncError::RoomHalted(self.room_code.clone()));
        }
        let tail_seq = self.events.back().map(|tail| tail.seq);
        if let Some(tail_seq) = tail_seq.filter(|seq| *seq != self.last_seq) {
            self.halt(tail_seq);
            return Err(SyncError::RoomHalted(self.room_code.clone()));
        }

        self.last_seq += 1;
        let event = Event {
            seq: self.last_seq,
            room_code: self.room_code.clone(),
            origin: origin.to_owned(),
            origin_name: origin_name.to_owned(),
            payload,
            timestamp: now_ms(),
        };
        self.events.push_back(event.clone());
        while self.events.len() > self.retention {
            self.events.pop_front();
        }
        Ok(event)
    }

    /// Sequence number of the newest event, 0 for an empty log.
    #[must_use]
    pub fn head(&self) -> u64 {
        self.last_seq
    }

    /// Retained events with `seq > after`, in order.
    #[must_use]
    pub fn events_since(&self, after: u64) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.seq > after)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn retained(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn halt(&mut self, tail_seq: u64) {
        self.halted = true;
        error!(room = %self.room_code, tail_seq, last_seq = self.last_seq, "event log sequence gap; room halted");
    }
}

#[cfg(test)]
#[path = "event_log_test.rs"]
mod tests;
