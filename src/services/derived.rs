//! Derived state: the projection every room event folds into.
//!
//! DESIGN
//! ======
//! The server and every client mirror run the same `DerivedState::apply`
//! over the same ordered events, which is what makes a late joiner's
//! snapshot plus tail converge with a participant present since creation.
//!
//! Inbound payloads are relative ("toggle this task", "start the timer").
//! `prepare` resolves them against the current state into absolute
//! payloads ("task X is now completed", "timer has 1432s left, running,
//! anchored at T") before they are appended. Folding an absolute payload
//! never depends on the folding side's clock or local view.
//!
//! Chat, files, and tasks de-duplicate on id, so a re-applied event is
//! harmless even outside the mirror's sequence check.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::frame::Data;
use crate::services::canvas::{CanvasState, DrawOp};
use crate::services::event_log::{Event, EventKind};
use crate::services::roster::{MediaKind, Participant, Roster};

pub const CHAT_HISTORY_LIMIT: usize = 500;
pub const MAX_CHAT_LEN: usize = 2000;
pub const MAX_NAME_LEN: usize = 64;
pub const MAX_NOTES_LEN: usize = 100_000;
pub const DEFAULT_TIMER_SECS: u64 = 1500;
pub const MAX_TIMER_MINUTES: u64 = 180;

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TaskOp {
    Add {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        text: String,
    },
    Toggle {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed: Option<bool>,
    },
    Delete {
        #[serde(rename = "taskId")]
        task_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesPayload {
    pub content: String,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerAction {
    Start,
    Pause,
    Reset,
    Set,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPayload {
    pub action: TimerAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u64>,
    /// Resolved timer after the action. Set by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(alias = "sharing")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PresenceOp {
    Joined { participant: Participant },
    Left {
        #[serde(rename = "participantId")]
        participant_id: String,
    },
}

/// Typed payload of an event, one variant per event kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Draw(DrawOp),
    Clear,
    Chat(ChatPayload),
    File(FilePayload),
    Task(TaskOp),
    Notes(NotesPayload),
    Timer(TimerPayload),
    Media(MediaPayload),
    Presence(PresenceOp),
}

impl Payload {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Draw(_) => EventKind::Draw,
            Self::Clear => EventKind::Clear,
            Self::Chat(_) => EventKind::Chat,
            Self::File(_) => EventKind::File,
            Self::Task(_) => EventKind::Task,
            Self::Notes(_) => EventKind::Notes,
            Self::Timer(_) => EventKind::Timer,
            Self::Media(_) => EventKind::Media,
            Self::Presence(_) => EventKind::Presence,
        }
    }

    /// Parse the `data` object of an envelope for the given kind.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` when `data` does not match the kind's shape.
    pub fn parse(kind: EventKind, data: &Data) -> Result<Self, SyncError> {
        let value = serde_json::Value::Object(data.clone());
        let parsed = match kind {
            EventKind::Draw => serde_json::from_value(value).map(Self::Draw),
            EventKind::Clear => Ok(Self::Clear),
            EventKind::Chat => serde_json::from_value(value).map(Self::Chat),
            EventKind::File => serde_json::from_value(value).map(Self::File),
            EventKind::Task => serde_json::from_value(value).map(Self::Task),
            EventKind::Notes => serde_json::from_value(value).map(Self::Notes),
            EventKind::Timer => serde_json::from_value(value).map(Self::Timer),
            EventKind::Media => serde_json::from_value(value).map(Self::Media),
            EventKind::Presence => serde_json::from_value(value).map(Self::Presence),
        };
        parsed.map_err(|e| SyncError::validation(format!("invalid {kind:?} payload: {e}")))
    }

    /// Serialize to the flat `data` object of an envelope.
    #[must_use]
    pub fn to_data(&self) -> Data {
        let value = match self {
            Self::Draw(op) => serde_json::to_value(op),
            Self::Clear => Ok(serde_json::Value::Object(Data::new())),
            Self::Chat(p) => serde_json::to_value(p),
            Self::File(p) => serde_json::to_value(p),
            Self::Task(op) => serde_json::to_value(op),
            Self::Notes(p) => serde_json::to_value(p),
            Self::Timer(p) => serde_json::to_value(p),
            Self::Media(p) => serde_json::to_value(p),
            Self::Presence(op) => serde_json::to_value(op),
        };
        match value {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Data::new(),
        }
    }
}

// =============================================================================
// STATE TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_by: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub author_id: String,
    pub author: String,
    pub text: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_by: String,
    pub uploaded_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotesSnapshot {
    pub text: String,
    pub version: u64,
}

/// Countdown anchored at `anchor_ms`. While running, the remaining time
/// decays from `remaining_secs` at the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub remaining_secs: u64,
    pub running: bool,
    pub anchor_ms: i64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self { remaining_secs: DEFAULT_TIMER_SECS, running: false, anchor_ms: 0 }
    }
}

impl TimerState {
    #[must_use]
    pub fn remaining_at(&self, now_ms: i64) -> u64 {
        if !self.running {
            return self.remaining_secs;
        }
        let elapsed = u64::try_from((now_ms - self.anchor_ms).max(0) / 1000).unwrap_or(0);
        self.remaining_secs.saturating_sub(elapsed)
    }

    /// Running and not yet expired.
    #[must_use]
    pub fn is_ticking(&self, now_ms: i64) -> bool {
        self.running && self.remaining_at(now_ms) > 0
    }

    /// The same countdown with expiry folded in: a running timer that has
    /// reached zero reads as stopped at zero.
    #[must_use]
    pub fn settled(&self, now_ms: i64) -> Self {
        if !self.running || self.is_ticking(now_ms) {
            return *self;
        }
        let secs = i64::try_from(self.remaining_secs).unwrap_or(i64::MAX / 1000);
        Self { remaining_secs: 0, running: false, anchor_ms: self.anchor_ms.saturating_add(secs * 1000) }
    }

    #[must_use]
    pub fn started(&self, now_ms: i64) -> Self {
        if self.is_ticking(now_ms) {
            return *self;
        }
        let remaining = self.remaining_at(now_ms);
        Self { remaining_secs: remaining, running: remaining > 0, anchor_ms: now_ms }
    }

    #[must_use]
    pub fn paused(&self, now_ms: i64) -> Self {
        Self { remaining_secs: self.remaining_at(now_ms), running: false, anchor_ms: now_ms }
    }

    #[must_use]
    pub fn reset(now_ms: i64) -> Self {
        Self { remaining_secs: DEFAULT_TIMER_SECS, running: false, anchor_ms: now_ms }
    }

    #[must_use]
    pub fn set_minutes(minutes: u64, now_ms: i64) -> Self {
        Self { remaining_secs: minutes * 60, running: false, anchor_ms: now_ms }
    }
}

// =============================================================================
// DERIVED STATE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedState {
    pub roster: Roster,
    pub tasks: Vec<Task>,
    pub chat: Vec<ChatMessage>,
    pub files: Vec<SharedFile>,
    pub notes: NotesSnapshot,
    pub timer: TimerState,
    pub canvas: CanvasState,
}

impl DerivedState {
    /// Validate a client payload and resolve it into an absolute payload.
    ///
    /// Returns `Ok(None)` for no-op requests (undo on an empty stack, commit
    /// without an open gesture), which are not appended to the log.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` for malformed or inapplicable payloads.
    pub fn prepare(&self, origin: &str, payload: Payload, now_ms: i64) -> Result<Option<Payload>, SyncError> {
        let resolved = match payload {
            Payload::Draw(op) => return Ok(self.prepare_draw(origin, op)?.map(Payload::Draw)),
            Payload::Clear => Payload::Clear,
            Payload::Chat(chat) => Payload::Chat(self.prepare_chat(chat)?),
            Payload::File(file) => Payload::File(self.prepare_file(file)?),
            Payload::Task(op) => Payload::Task(self.prepare_task(op)?),
            Payload::Notes(notes) => {
                if notes.content.chars().count() > MAX_NOTES_LEN {
                    return Err(SyncError::validation(format!("notes exceed {MAX_NOTES_LEN} characters")));
                }
                Payload::Notes(NotesPayload { content: notes.content, version: self.notes.version + 1 })
            }
            Payload::Timer(timer) => Payload::Timer(self.prepare_timer(timer, now_ms)?),
            Payload::Media(media) => {
                if !self.roster.contains(origin) {
                    return Err(SyncError::validation("media toggle from a participant not in the roster"));
                }
                Payload::Media(media)
            }
            Payload::Presence(_) => return Err(SyncError::validation("presence events are server-generated")),
        };
        Ok(Some(resolved))
    }

    fn prepare_draw(&self, origin: &str, op: DrawOp) -> Result<Option<DrawOp>, SyncError> {
        match op {
            DrawOp::Segment(segment) => {
                segment.validate().map_err(SyncError::ValidationFailed)?;
                Ok(Some(DrawOp::Segment(segment)))
            }
            DrawOp::Commit { .. } => {
                if !self.canvas.has_open_gesture(origin) {
                    return Ok(None);
                }
                Ok(Some(DrawOp::Commit { stroke_id: Some(Uuid::new_v4().to_string()) }))
            }
            DrawOp::Undo { .. } => Ok(self
                .canvas
                .peek_undo(origin)
                .map(|id| DrawOp::Undo { stroke_id: Some(id.to_owned()) })),
        }
    }

    fn prepare_chat(&self, chat: ChatPayload) -> Result<ChatPayload, SyncError> {
        if chat.text.trim().is_empty() {
            return Err(SyncError::validation("chat text is required"));
        }
        if chat.text.chars().count() > MAX_CHAT_LEN {
            return Err(SyncError::validation(format!("chat text exceeds {MAX_CHAT_LEN} characters")));
        }
        let id = resolve_id(chat.id, |id| self.chat.iter().any(|m| m.id == id), "chat message")?;
        Ok(ChatPayload { id: Some(id), text: chat.text })
    }

    fn prepare_file(&self, file: FilePayload) -> Result<FilePayload, SyncError> {
        let name = file.name.trim();
        if name.is_empty() {
            return Err(SyncError::validation("file name is required"));
        }
        let id = resolve_id(file.id, |id| self.files.iter().any(|f| f.id == id), "file")?;
        Ok(FilePayload { id: Some(id), name: name.to_owned(), size: file.size, mime_type: file.mime_type })
    }

    fn prepare_task(&self, op: TaskOp) -> Result<TaskOp, SyncError> {
        match op {
            TaskOp::Add { id, text } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(SyncError::validation("task text is required"));
                }
                let id = resolve_id(id, |id| self.task(id).is_some(), "task")?;
                Ok(TaskOp::Add { id: Some(id), text: text.to_owned() })
            }
            TaskOp::Toggle { task_id, .. } => {
                let Some(task) = self.task(&task_id) else {
                    return Err(SyncError::validation(format!("unknown task: {task_id}")));
                };
                let completed = Some(!task.completed);
                Ok(TaskOp::Toggle { task_id, completed })
            }
            TaskOp::Delete { task_id } => {
                if self.task(&task_id).is_none() {
                    return Err(SyncError::validation(format!("unknown task: {task_id}")));
                }
                Ok(TaskOp::Delete { task_id })
            }
        }
    }

    fn prepare_timer(&self, timer: TimerPayload, now_ms: i64) -> Result<TimerPayload, SyncError> {
        let next = match timer.action {
            TimerAction::Start => self.timer.started(now_ms),
            TimerAction::Pause => self.timer.paused(now_ms),
            TimerAction::Reset => TimerState::reset(now_ms),
            TimerAction::Set => {
                let minutes = timer.minutes.unwrap_or(0);
                if !(1..=MAX_TIMER_MINUTES).contains(&minutes) {
                    return Err(SyncError::validation(format!(
                        "timer minutes must be between 1 and {MAX_TIMER_MINUTES}"
                    )));
                }
                TimerState::set_minutes(minutes, now_ms)
            }
        };
        Ok(TimerPayload { action: timer.action, minutes: timer.minutes, timer: Some(next) })
    }

    /// Fold one stamped event into the state.
    pub fn apply(&mut self, event: &Event) {
        let origin = event.origin.as_str();
        match &event.payload {
            Payload::Draw(DrawOp::Segment(segment)) => self.canvas.draw_segment(origin, segment.clone()),
            Payload::Draw(DrawOp::Commit { stroke_id: Some(id) }) => {
                self.canvas.commit(origin, id);
            }
            Payload::Draw(DrawOp::Undo { stroke_id: Some(id) }) => {
                self.canvas.undo(origin, id);
            }
            Payload::Draw(DrawOp::Commit { stroke_id: None } | DrawOp::Undo { stroke_id: None }) => {}
            Payload::Clear => self.canvas.clear(),
            Payload::Chat(chat) => self.apply_chat(event, chat),
            Payload::File(file) => {
                let Some(id) = &file.id else { return };
                if self.files.iter().any(|f| &f.id == id) {
                    return;
                }
                self.files.push(SharedFile {
                    id: id.clone(),
                    name: file.name.clone(),
                    size: file.size,
                    mime_type: file.mime_type.clone(),
                    uploaded_by: event.origin_name.clone(),
                    uploaded_at: event.timestamp,
                });
            }
            Payload::Task(op) => self.apply_task(event, op),
            Payload::Notes(notes) => {
                // Last writer wins; versions only move forward.
                if notes.version >= self.notes.version {
                    self.notes = NotesSnapshot { text: notes.content.clone(), version: notes.version };
                }
            }
            Payload::Timer(timer) => {
                if let Some(state) = timer.timer {
                    self.timer = state;
                }
            }
            Payload::Media(media) => {
                self.roster.set_media(origin, media.kind, media.enabled);
            }
            Payload::Presence(PresenceOp::Joined { participant }) => {
                self.roster.add(participant.clone());
            }
            Payload::Presence(PresenceOp::Left { participant_id }) => {
                self.roster.remove(participant_id);
                self.canvas
                    .abandon(participant_id, &format!("orphan-{}", event.seq));
            }
        }
    }

    fn apply_chat(&mut self, event: &Event, chat: &ChatPayload) {
        let Some(id) = &chat.id else { return };
        if self.chat.iter().any(|m| &m.id == id) {
            return;
        }
        self.chat.push(ChatMessage {
            id: id.clone(),
            author_id: event.origin.clone(),
            author: event.origin_name.clone(),
            text: chat.text.clone(),
            timestamp: event.timestamp,
        });
        if self.chat.len() > CHAT_HISTORY_LIMIT {
            let excess = self.chat.len() - CHAT_HISTORY_LIMIT;
            self.chat.drain(..excess);
        }
    }

    fn apply_task(&mut self, event: &Event, op: &TaskOp) {
        match op {
            TaskOp::Add { id: Some(id), text } => {
                if self.task(id).is_some() {
                    return;
                }
                self.tasks.push(Task {
                    id: id.clone(),
                    text: text.clone(),
                    completed: false,
                    created_by: event.origin_name.clone(),
                    created_at: event.timestamp,
                });
            }
            TaskOp::Add { id: None, .. } => {}
            TaskOp::Toggle { task_id, completed } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| &t.id == task_id) {
                    task.completed = completed.unwrap_or(!task.completed);
                }
            }
            TaskOp::Delete { task_id } => self.tasks.retain(|t| &t.id != task_id),
        }
    }

    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Use the client-supplied id when it is fresh, otherwise mint one.
fn resolve_id(requested: Option<String>, taken: impl Fn(&str) -> bool, what: &str) -> Result<String, SyncError> {
    match requested.map(|id| id.trim().to_owned()).filter(|id| !id.is_empty()) {
        Some(id) if id.len() > MAX_NAME_LEN => Err(SyncError::validation(format!("{what} id is too long"))),
        Some(id) if taken(&id) => Err(SyncError::validation(format!("duplicate {what} id: {id}"))),
        Some(id) => Ok(id),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

#[cfg(test)]
#[path = "derived_test.rs"]
mod tests;
