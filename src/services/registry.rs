//! Room registry: creation, lookup, and destruction of live rooms.
//!
//! DESIGN
//! ======
//! The registry is a map from room code to `Arc<Mutex<Room>>`. Its own
//! `RwLock` is held only to look up, insert, or remove entries, never while
//! a room processes events, so rooms run independently of each other.
//!
//! Creating or joining a room returns an `Admission`: the admitted
//! participant, the snapshot taken at attach time, and the receiving end of
//! the participant's bounded outbound queue. The gateway owns the receiver
//! for the rest of the connection.
//!
//! Room codes are six base-36 characters. A sampled code that collides with
//! a live room is re-sampled until it is unique.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::info;

use crate::config::RoomConfig;
use crate::error::SyncError;
use crate::frame::Envelope;
use crate::services::roster::Participant;
use crate::services::room::{Room, RoomSummary, Snapshot, validate_name};

pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub type RoomHandle = Arc<Mutex<Room>>;

// =============================================================================
// TYPES
// =============================================================================

/// Sent to a client right after a successful create or join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub room_code: String,
    pub room_name: String,
    pub participant_id: String,
    pub is_host: bool,
    pub color: String,
}

/// Result of a successful create or join.
pub struct Admission {
    pub room: RoomHandle,
    pub participant: Participant,
    pub snapshot: Snapshot,
    pub outbound: mpsc::Receiver<Envelope>,
}

impl Admission {
    #[must_use]
    pub fn session(&self) -> SessionInfo {
        SessionInfo {
            room_code: self.snapshot.room_code.clone(),
            room_name: self.snapshot.room_name.clone(),
            participant_id: self.participant.id.clone(),
            is_host: self.participant.is_host,
            color: self.participant.color.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Registry {
    rooms: Arc<RwLock<HashMap<String, RoomHandle>>>,
    config: RoomConfig,
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl Registry {
    #[must_use]
    pub fn new(config: RoomConfig) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), config }
    }

    /// Create a room and admit its host.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when either name is blank or too long.
    pub async fn create_room(
        &self,
        host_name: &str,
        room_name: &str,
        requested_id: Option<&str>,
    ) -> Result<Admission, SyncError> {
        let host_name = validate_name(host_name, "host name")?;
        let room_name = validate_name(room_name, "room name")?;

        let mut rooms = self.rooms.write().await;
        let code = generate_unique_code(|code| rooms.contains_key(code), random_room_code);

        let mut room = Room::new(code.clone(), room_name, &self.config);
        let participant = room.admit(host_name, requested_id, true)?;
        let (tx, outbound) = mpsc::channel(self.config.outbound_capacity);
        let snapshot = room.attach(&participant.id, tx);

        let handle = Arc::new(Mutex::new(room));
        rooms.insert(code.clone(), handle.clone());
        info!(room = %code, host = %participant.id, live_rooms = rooms.len(), "room created");

        Ok(Admission { room: handle, participant, snapshot, outbound })
    }

    /// Admit a participant into an existing room.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` for a malformed code, name, or reused
    /// participant id, and `RoomNotFound` when no live room has the code.
    pub async fn join_room(
        &self,
        code: &str,
        display_name: &str,
        requested_id: Option<&str>,
    ) -> Result<Admission, SyncError> {
        let handle = self.lookup(code).await?;
        let mut room = handle.lock().await;
        let participant = room.admit(display_name, requested_id, false)?;
        let (tx, outbound) = mpsc::channel(self.config.outbound_capacity);
        let snapshot = room.attach(&participant.id, tx);
        drop(room);

        Ok(Admission { room: handle, participant, snapshot, outbound })
    }

    /// Find a live room by code.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` for a malformed code and `RoomNotFound`
    /// when no live room has it.
    pub async fn lookup(&self, code: &str) -> Result<RoomHandle, SyncError> {
        let code = normalize_room_code(code)?;
        let rooms = self.rooms.read().await;
        rooms
            .get(&code)
            .cloned()
            .ok_or(SyncError::RoomNotFound(code))
    }

    /// Public summary of a live room.
    ///
    /// # Errors
    ///
    /// Same as `lookup`.
    pub async fn summary(&self, code: &str) -> Result<RoomSummary, SyncError> {
        let handle = self.lookup(code).await?;
        let room = handle.lock().await;
        Ok(room.summary())
    }

    /// Destroy every room whose roster has been empty for the grace period.
    /// Returns the codes of destroyed rooms.
    ///
    /// Rooms are checked without holding the registry lock, so a busy room
    /// delays only the sweep, never create, join, or lookup.
    pub async fn reap(&self, now: Instant) -> Vec<String> {
        let candidates: Vec<(String, RoomHandle)> = {
            let rooms = self.rooms.read().await;
            rooms.iter().map(|(code, handle)| (code.clone(), handle.clone())).collect()
        };

        let mut expired = Vec::new();
        for (code, handle) in candidates {
            let mut room = handle.lock().await;
            if room.is_expired(now, self.config.grace_period) {
                room.destroy();
                drop(room);
                expired.push((code, handle));
            }
        }
        if expired.is_empty() {
            return Vec::new();
        }

        let mut rooms = self.rooms.write().await;
        let mut reaped = Vec::with_capacity(expired.len());
        for (code, handle) in expired {
            if rooms.get(&code).is_some_and(|live| Arc::ptr_eq(live, &handle)) {
                rooms.remove(&code);
                info!(room = %code, "room destroyed after grace period");
                reaped.push(code);
            }
        }
        reaped
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    #[must_use]
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }
}

// =============================================================================
// ROOM CODES
// =============================================================================

/// Trim and uppercase a user-typed code.
///
/// # Errors
///
/// Returns `ValidationFailed` unless the result is exactly six ASCII
/// alphanumerics.
pub fn normalize_room_code(raw: &str) -> Result<String, SyncError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != ROOM_CODE_LEN || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(SyncError::validation(format!(
            "room code must be {ROOM_CODE_LEN} letters or digits, got {:?}",
            raw.trim()
        )));
    }
    Ok(code)
}

#[must_use]
pub fn random_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

/// Sample codes until one is not taken.
pub fn generate_unique_code(taken: impl Fn(&str) -> bool, mut sample: impl FnMut() -> String) -> String {
    loop {
        let code = sample();
        if !taken(&code) {
            return code;
        }
        info!(room = %code, "room code collision; resampling");
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
