//! Participant roster: connected identities of one room, in join order.
//!
//! The roster itself is a plain ordered list. The presence side effect
//! (one `presence` event per add/remove) lives in `Room`, which owns the
//! event log; the roster is folded from those events on both the server
//! and every client mirror.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fixed avatar palette. Collisions between participants are allowed.
pub const PALETTE: [&str; 8] = ["#6366f1", "#ec4899", "#14b8a6", "#f59e0b", "#10b981", "#ef4444", "#8b5cf6", "#06b6d4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Mic,
    Camera,
    Screen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub is_host: bool,
    pub color: String,
    pub mic_enabled: bool,
    pub camera_enabled: bool,
    pub screen_sharing: bool,
    pub joined_at: i64,
}

impl Participant {
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, is_host: bool, joined_at: i64) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            is_host,
            color: pick_color(),
            mic_enabled: true,
            camera_enabled: true,
            screen_sharing: false,
            joined_at,
        }
    }
}

#[must_use]
pub fn pick_color() -> String {
    let idx = rand::rng().random_range(0..PALETTE.len());
    PALETTE[idx].to_owned()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    participants: Vec<Participant>,
}

impl Roster {
    /// Append a participant. Re-adding a known id is a no-op so replayed
    /// presence events stay idempotent.
    pub fn add(&mut self, participant: Participant) -> bool {
        if self.contains(&participant.id) {
            return false;
        }
        self.participants.push(participant);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        let idx = self.participants.iter().position(|p| p.id == id)?;
        Some(self.participants.remove(idx))
    }

    pub fn set_media(&mut self, id: &str, kind: MediaKind, enabled: bool) -> bool {
        let Some(p) = self.participants.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        match kind {
            MediaKind::Mic => p.mic_enabled = enabled,
            MediaKind::Camera => p.camera_enabled = enabled,
            MediaKind::Screen => p.screen_sharing = enabled,
        }
        true
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Participants ordered by join time.
    #[must_use]
    pub fn list(&self) -> &[Participant] {
        &self.participants
    }

    #[must_use]
    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
