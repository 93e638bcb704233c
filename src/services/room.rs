//! Room: one collaboration session: log, derived state, and connections.
//!
//! DESIGN
//! ======
//! A room is owned by the registry behind `Arc<Mutex<Room>>`. Holding the
//! mutex is the single-writer discipline: every mutation (presence, canvas,
//! tasks, notes, timer, media) goes through `record`, which appends to the
//! log, folds the event into derived state, and hands it to every attached
//! connection in one critical section. Different rooms share nothing and
//! run fully in parallel.
//!
//! Fan-out never awaits. Each connection owns a bounded outbound queue and
//! `record` uses `try_send`; a connection whose queue is full (or already
//! closed) is detached and removed from the roster, so one stalled client
//! cannot stall the room or grow memory without bound.
//!
//! LIFECYCLE
//! =========
//! 1. Created by the registry with its host admitted.
//! 2. `admit` + `attach` per joiner; the snapshot is taken under the same
//!    lock that registers the outbound queue, so the joiner receives every
//!    event after the snapshot's `seq` exactly once.
//! 3. `remove_participant` on disconnect. When the roster empties the room
//!    records `empty_since` and the reaper destroys it after the grace
//!    period unless someone joins first.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RoomConfig;
use crate::error::SyncError;
use crate::frame::{Envelope, now_ms};
use crate::services::derived::{DerivedState, MAX_NAME_LEN, Payload, PresenceOp};
use crate::services::event_log::{Event, EventLog};
use crate::services::roster::Participant;

// =============================================================================
// TYPES
// =============================================================================

/// Point-in-time copy of a room handed to joiners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub room_code: String,
    pub room_name: String,
    pub created_at: i64,
    /// Log head at the time of the snapshot.
    pub seq: u64,
    pub state: DerivedState,
}

/// Public summary used by the room lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_code: String,
    pub name: String,
    pub participants: usize,
    pub created_at: i64,
}

pub struct Room {
    code: String,
    name: String,
    created_at: i64,
    log: EventLog,
    state: DerivedState,
    /// Outbound queues keyed by participant id.
    connections: HashMap<String, mpsc::Sender<Envelope>>,
    /// Every participant id ever admitted. Ids are never reused.
    used_ids: HashSet<String>,
    empty_since: Option<Instant>,
    destroyed: bool,
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

impl Room {
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>, config: &RoomConfig) -> Self {
        let code = code.into();
        Self {
            log: EventLog::new(code.clone(), config.log_retention),
            code,
            name: name.into(),
            created_at: now_ms(),
            state: DerivedState::default(),
            connections: HashMap::new(),
            used_ids: HashSet::new(),
            empty_since: Some(Instant::now()),
            destroyed: false,
        }
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

impl Room {
    /// Admit a participant and record their `joined` presence event.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` for a blank name or a reused participant
    /// id, and `RoomNotFound` if the room was destroyed meanwhile.
    pub fn admit(
        &mut self,
        display_name: &str,
        requested_id: Option<&str>,
        is_host: bool,
    ) -> Result<Participant, SyncError> {
        if self.destroyed {
            return Err(SyncError::RoomNotFound(self.code.clone()));
        }
        let display_name = validate_name(display_name, "display name")?;
        let id = match requested_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) if id.len() > MAX_NAME_LEN => {
                return Err(SyncError::validation("participant id is too long"));
            }
            Some(id) if self.used_ids.contains(id) => {
                return Err(SyncError::validation(format!("participant id already used in this room: {id}")));
            }
            Some(id) => id.to_owned(),
            None => Uuid::new_v4().to_string(),
        };

        let participant = Participant::new(id, display_name, is_host, now_ms());
        self.record(
            &participant.id,
            &participant.display_name,
            Payload::Presence(PresenceOp::Joined { participant: participant.clone() }),
        )?;
        self.used_ids.insert(participant.id.clone());
        self.empty_since = None;

        info!(room = %self.code, participant = %participant.id, host = is_host, "participant admitted");
        Ok(participant)
    }

    /// Register an outbound queue and return the matching snapshot.
    pub fn attach(&mut self, participant_id: &str, tx: mpsc::Sender<Envelope>) -> Snapshot {
        self.connections.insert(participant_id.to_owned(), tx);
        self.snapshot()
    }

    /// Detach a participant's connection and remove them from the roster.
    /// Returns `false` if they were not in the roster.
    pub fn remove_participant(&mut self, participant_id: &str) -> bool {
        self.connections.remove(participant_id);
        let Some(participant) = self.state.roster.get(participant_id).cloned() else {
            return false;
        };

        let left = Payload::Presence(PresenceOp::Left { participant_id: participant.id.clone() });
        if let Err(e) = self.record(&participant.id, &participant.display_name, left) {
            // The log refuses writes; keep the roster honest so the room can still be reaped.
            warn!(room = %self.code, participant = %participant_id, error = %e, "presence not recorded");
            self.state.roster.remove(participant_id);
        }

        if self.state.roster.is_empty() {
            self.empty_since = Some(Instant::now());
            info!(room = %self.code, "room empty; grace period started");
        }
        info!(room = %self.code, participant = %participant_id, remaining = self.state.roster.len(), "participant removed");
        true
    }
}

// =============================================================================
// MUTATION
// =============================================================================

impl Room {
    /// Validate, resolve, append, and replicate a client payload.
    ///
    /// Returns `Ok(None)` when the request was a no-op (nothing appended).
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if the origin is no longer in the roster,
    /// `ValidationFailed` for bad payloads, and `RoomHalted` if the log
    /// refuses writes.
    pub fn submit(&mut self, origin: &Participant, payload: Payload) -> Result<Option<Event>, SyncError> {
        if self.log.is_halted() {
            return Err(SyncError::RoomHalted(self.code.clone()));
        }
        if !self.state.roster.contains(&origin.id) {
            return Err(SyncError::Disconnected(format!("{} is no longer in room {}", origin.id, self.code)));
        }
        let Some(resolved) = self.state.prepare(&origin.id, payload, now_ms())? else {
            debug!(room = %self.code, participant = %origin.id, "no-op request ignored");
            return Ok(None);
        };
        self.record(&origin.id, &origin.display_name, resolved).map(Some)
    }

    /// Append, fold, and fan out. The only path that mutates derived state.
    fn record(&mut self, origin: &str, origin_name: &str, payload: Payload) -> Result<Event, SyncError> {
        let event = self.log.append(payload, origin, origin_name)?;
        self.state.apply(&event);
        debug!(room = %self.code, seq = event.seq, kind = ?event.kind(), origin, "event recorded");

        let lagging = self.replicate(&event);
        for participant_id in lagging {
            warn!(room = %self.code, participant = %participant_id, "outbound queue full; disconnecting");
            self.remove_participant(&participant_id);
        }
        Ok(event)
    }

    /// Push an event to every attached connection, origin included (the
    /// echo carries the assigned `seq`). Returns connections that could not
    /// accept it.
    fn replicate(&mut self, event: &Event) -> Vec<String> {
        let envelope = Envelope::from(event);
        let mut lagging = Vec::new();
        for (participant_id, tx) in &self.connections {
            if tx.try_send(envelope.clone()).is_err() {
                lagging.push(participant_id.clone());
            }
        }
        for participant_id in &lagging {
            // Dropping the sender closes the connection's queue.
            self.connections.remove(participant_id);
        }
        lagging
    }
}

// =============================================================================
// READS
// =============================================================================

impl Room {
    /// Deep copy of the room at the current log head. An expired timer is
    /// reported as stopped.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut state = self.state.clone();
        state.timer = state.timer.settled(now_ms());
        Snapshot {
            room_code: self.code.clone(),
            room_name: self.name.clone(),
            created_at: self.created_at,
            seq: self.log.head(),
            state,
        }
    }

    #[must_use]
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_code: self.code.clone(),
            name: self.name.clone(),
            participants: self.state.roster.len(),
            created_at: self.created_at,
        }
    }

    #[must_use]
    pub fn events_since(&self, after: u64) -> Vec<Event> {
        self.log.events_since(after)
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn state(&self) -> &DerivedState {
        &self.state
    }

    #[must_use]
    pub fn head(&self) -> u64 {
        self.log.head()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.log.is_halted()
    }

    /// True once the roster has been empty for at least `grace`.
    #[must_use]
    pub fn is_expired(&self, now: Instant, grace: Duration) -> bool {
        self.empty_since
            .is_some_and(|since| now.saturating_duration_since(since) >= grace)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Mark destroyed and drop every outbound queue.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.connections.clear();
    }
}

/// Trim and bound a required human-readable name.
///
/// # Errors
///
/// Returns `ValidationFailed` when the name is blank or too long.
pub fn validate_name<'a>(raw: &'a str, what: &str) -> Result<&'a str, SyncError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SyncError::validation(format!("{what} is required")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(SyncError::validation(format!("{what} exceeds {MAX_NAME_LEN} characters")));
    }
    Ok(name)
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
