//! Client mirror: a participant's local replica of one room.
//!
//! DESIGN
//! ======
//! A mirror starts from the `session` and `snapshot` envelopes and then
//! folds replicated events with the same `DerivedState::apply` the server
//! uses. Events are applied strictly in `seq` order: early arrivals wait in
//! a pending buffer, duplicates (`seq` at or below the applied head) and
//! events for other rooms are dropped.
//!
//! Local drawing is optimistic. Segments produced by the pointer are kept
//! in a preview list and rendered immediately; when the server echoes one
//! of our segments it moves from the preview into derived state, so the
//! echo is never drawn twice. The server answers one connection in order,
//! so an echo also retires any older preview entries that were never
//! echoed. An `error` envelope discards the whole preview and leaves the
//! derived state as the only source of truth.

use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::error::SyncError;
use crate::frame::{Envelope, MessageType};
use crate::services::canvas::{DrawOp, Point, Pointer, Segment, Tool};
use crate::services::derived::{DerivedState, Payload, TimerState};
use crate::services::event_log::Event;
use crate::services::registry::SessionInfo;
use crate::services::room::Snapshot;

pub struct ClientMirror {
    session: SessionInfo,
    user_name: String,
    applied: u64,
    state: DerivedState,
    pending: BTreeMap<u64, Event>,
    pointer: Pointer,
    preview: VecDeque<Segment>,
}

impl ClientMirror {
    /// Build a mirror from the handshake envelopes.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when the snapshot belongs to another room.
    pub fn bootstrap(session: SessionInfo, snapshot: Snapshot) -> Result<Self, SyncError> {
        if snapshot.room_code != session.room_code {
            return Err(SyncError::validation(format!(
                "snapshot for {} does not match session room {}",
                snapshot.room_code, session.room_code
            )));
        }
        let user_name = snapshot
            .state
            .roster
            .get(&session.participant_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_default();
        Ok(Self {
            session,
            user_name,
            applied: snapshot.seq,
            state: snapshot.state,
            pending: BTreeMap::new(),
            pointer: Pointer::default(),
            preview: VecDeque::new(),
        })
    }

    /// Fold one inbound envelope. Returns the events applied as a result,
    /// in order (possibly several when it fills a gap, possibly none).
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when a replicated event cannot be parsed.
    pub fn receive(&mut self, envelope: &Envelope) -> Result<Vec<Event>, SyncError> {
        if envelope.kind == MessageType::Error {
            debug!(room = %self.session.room_code, discarded = self.preview.len(), "request rejected; preview rolled back");
            self.preview.clear();
            return Ok(Vec::new());
        }
        if envelope.seq.is_none() {
            return Ok(Vec::new());
        }
        if !envelope.room_code.eq_ignore_ascii_case(&self.session.room_code) {
            debug!(room = %self.session.room_code, target = %envelope.room_code, "event for another room dropped");
            return Ok(Vec::new());
        }
        let event = Event::try_from(envelope)?;
        if event.seq <= self.applied {
            debug!(seq = event.seq, applied = self.applied, "duplicate event dropped");
            return Ok(Vec::new());
        }
        self.pending.insert(event.seq, event);

        let mut applied = Vec::new();
        while let Some(event) = self.pending.remove(&(self.applied + 1)) {
            self.fold(&event);
            applied.push(event);
        }
        Ok(applied)
    }

    fn fold(&mut self, event: &Event) {
        if event.origin == self.session.participant_id {
            if let Payload::Draw(DrawOp::Segment(segment)) = &event.payload {
                if let Some(at) = self.preview.iter().position(|p| p == segment) {
                    self.preview.drain(..=at);
                }
            }
        }
        self.state.apply(event);
        self.applied = event.seq;
    }
}

// =============================================================================
// LOCAL INPUT
// =============================================================================

impl ClientMirror {
    pub fn pointer_down(&mut self, tool: Tool, at: Point, color: Option<String>) {
        self.pointer.down(tool, at, color);
    }

    /// Draw a segment locally and return the envelope that sends it.
    pub fn pointer_move(&mut self, to: Point) -> Option<Envelope> {
        let segment = self.pointer.move_to(to)?;
        self.preview.push_back(segment.clone());
        Some(self.outbound(&Payload::Draw(DrawOp::Segment(segment))))
    }

    pub fn pointer_up(&mut self) -> Option<Envelope> {
        let commit = self.pointer.up()?;
        Some(self.outbound(&Payload::Draw(commit)))
    }

    /// Request an undo of our newest stroke, if we have one.
    pub fn undo(&self) -> Option<Envelope> {
        if self.state.canvas.undo_depth(&self.session.participant_id) == 0 {
            return None;
        }
        Some(self.outbound(&Payload::Draw(DrawOp::Undo { stroke_id: None })))
    }

    #[must_use]
    pub fn clear(&self) -> Envelope {
        self.outbound(&Payload::Clear)
    }

    /// Stamp any payload for this session's room and participant.
    #[must_use]
    pub fn outbound(&self, payload: &Payload) -> Envelope {
        Envelope::new(MessageType::from(payload.kind()), payload.to_data())
            .with_room(&self.session.room_code)
            .with_user(&self.session.participant_id, &self.user_name)
    }
}

// =============================================================================
// READS
// =============================================================================

impl ClientMirror {
    #[must_use]
    pub fn state(&self) -> &DerivedState {
        &self.state
    }

    /// The countdown as it should be displayed at `now_ms`.
    #[must_use]
    pub fn timer_at(&self, now_ms: i64) -> TimerState {
        self.state.timer.settled(now_ms)
    }

    #[must_use]
    pub fn applied_seq(&self) -> u64 {
        self.applied
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Locally drawn segments the server has not echoed yet.
    pub fn preview(&self) -> impl Iterator<Item = &Segment> {
        self.preview.iter()
    }

    #[must_use]
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    #[must_use]
    pub fn is_stroking(&self) -> bool {
        self.pointer.is_stroking()
    }
}

#[cfg(test)]
#[path = "mirror_test.rs"]
mod tests;
