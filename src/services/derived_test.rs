use super::*;
use crate::services::canvas::{PEN_WIDTH, Point, Segment, Tool};
use serde_json::json;

const NOW: i64 = 1_700_000_000_000;

/// Drives prepare + apply the way a room does, without a log.
#[derive(Default)]
struct Harness {
    state: DerivedState,
    seq: u64,
}

impl Harness {
    fn with_participants(ids: &[&str]) -> Self {
        let mut h = Self::default();
        for (i, id) in ids.iter().enumerate() {
            let participant = Participant::new(*id, format!("name-{id}"), i == 0, NOW);
            h.stamp(id, Payload::Presence(PresenceOp::Joined { participant }));
        }
        h
    }

    fn stamp(&mut self, origin: &str, payload: Payload) -> Event {
        self.seq += 1;
        let event = Event {
            seq: self.seq,
            room_code: "ABC123".into(),
            origin: origin.into(),
            origin_name: format!("name-{origin}"),
            payload,
            timestamp: NOW,
        };
        self.state.apply(&event);
        event
    }

    fn submit_at(&mut self, origin: &str, payload: Payload, now: i64) -> Result<Option<Event>, SyncError> {
        let Some(resolved) = self.state.prepare(origin, payload, now)? else {
            return Ok(None);
        };
        Ok(Some(self.stamp(origin, resolved)))
    }

    fn submit(&mut self, origin: &str, payload: Payload) -> Result<Option<Event>, SyncError> {
        self.submit_at(origin, payload, NOW)
    }
}

fn segment() -> Payload {
    Payload::Draw(DrawOp::Segment(Segment {
        tool: Tool::Pen,
        from: Point::new(0.0, 0.0),
        to: Point::new(10.0, 10.0),
        color: Some("#111111".into()),
        width: PEN_WIDTH,
    }))
}

fn commit() -> Payload {
    Payload::Draw(DrawOp::Commit { stroke_id: None })
}

fn undo() -> Payload {
    Payload::Draw(DrawOp::Undo { stroke_id: None })
}

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn parse_reads_kind_specific_shapes() {
    let data = json!({"action": "toggle", "taskId": "t1"});
    let payload = Payload::parse(EventKind::Task, data.as_object().expect("object")).expect("parse");
    assert_eq!(payload, Payload::Task(TaskOp::Toggle { task_id: "t1".into(), completed: None }));

    let data = json!({"type": "screen", "sharing": true});
    let payload = Payload::parse(EventKind::Media, data.as_object().expect("object")).expect("parse");
    assert_eq!(payload, Payload::Media(MediaPayload { kind: MediaKind::Screen, enabled: true }));
}

#[test]
fn parse_rejects_malformed_data() {
    let data = json!({"action": "segment", "tool": "crayon"});
    let err = Payload::parse(EventKind::Draw, data.as_object().expect("object")).expect_err("bad tool");
    assert!(matches!(err, SyncError::ValidationFailed(_)));
}

#[test]
fn to_data_of_clear_is_empty_object() {
    assert!(Payload::Clear.to_data().is_empty());
}

// =============================================================================
// CANVAS
// =============================================================================

#[test]
fn commit_gets_server_stroke_id() {
    let mut h = Harness::with_participants(&["ana"]);
    h.submit("ana", segment()).expect("segment");
    let event = h.submit("ana", commit()).expect("commit").expect("appended");
    let Payload::Draw(DrawOp::Commit { stroke_id: Some(id) }) = &event.payload else {
        panic!("commit should carry a stroke id: {:?}", event.payload);
    };
    assert_eq!(h.state.canvas.strokes()[0].id, *id);
}

#[test]
fn noop_draw_requests_resolve_to_nothing() {
    let mut h = Harness::with_participants(&["ana"]);
    assert!(h.submit("ana", commit()).expect("commit").is_none());
    assert!(h.submit("ana", undo()).expect("undo").is_none());
    assert_eq!(h.seq, 1, "only the presence event was stamped");
}

#[test]
fn undo_targets_origins_newest_stroke() {
    let mut h = Harness::with_participants(&["ana", "ben"]);
    for who in ["ana", "ben", "ana"] {
        h.submit(who, segment()).expect("segment");
        h.submit(who, commit()).expect("commit");
    }
    let ana_newest = h.state.canvas.peek_undo("ana").map(str::to_owned);

    let event = h.submit("ana", undo()).expect("undo").expect("appended");
    assert_eq!(event.payload, Payload::Draw(DrawOp::Undo { stroke_id: ana_newest }));
    assert_eq!(h.state.canvas.strokes().len(), 2);
    assert_eq!(h.state.canvas.undo_depth("ana"), 1);
    assert_eq!(h.state.canvas.undo_depth("ben"), 1);
}

#[test]
fn invalid_segment_is_rejected() {
    let mut h = Harness::with_participants(&["ana"]);
    let Payload::Draw(DrawOp::Segment(mut bad)) = segment() else { unreachable!() };
    bad.width = -1.0;
    let err = h
        .submit("ana", Payload::Draw(DrawOp::Segment(bad)))
        .expect_err("negative width");
    assert!(matches!(err, SyncError::ValidationFailed(_)));
}

#[test]
fn leaving_participant_leaves_no_open_gesture() {
    let mut h = Harness::with_participants(&["ana", "ben"]);
    h.submit("ben", segment()).expect("segment");
    h.stamp("ben", Payload::Presence(PresenceOp::Left { participant_id: "ben".into() }));

    assert!(!h.state.canvas.has_open_gesture("ben"));
    assert_eq!(h.state.canvas.strokes().len(), 1);
    assert!(!h.state.roster.contains("ben"));
}

// =============================================================================
// CHAT, FILES, TASKS
// =============================================================================

#[test]
fn chat_assigns_id_and_rejects_duplicates() {
    let mut h = Harness::with_participants(&["ana"]);
    let event = h
        .submit("ana", Payload::Chat(ChatPayload { id: None, text: "hello".into() }))
        .expect("chat")
        .expect("appended");
    let Payload::Chat(ChatPayload { id: Some(id), .. }) = &event.payload else {
        panic!("chat id should be resolved");
    };
    assert_eq!(h.state.chat[0].author, "name-ana");

    let err = h
        .submit("ana", Payload::Chat(ChatPayload { id: Some(id.clone()), text: "again".into() }))
        .expect_err("duplicate id");
    assert!(matches!(err, SyncError::ValidationFailed(_)));
}

#[test]
fn chat_text_bounds() {
    let mut h = Harness::with_participants(&["ana"]);
    let blank = Payload::Chat(ChatPayload { id: None, text: "   ".into() });
    assert!(h.submit("ana", blank).is_err());
    let long = Payload::Chat(ChatPayload { id: None, text: "x".repeat(MAX_CHAT_LEN + 1) });
    assert!(h.submit("ana", long).is_err());
}

#[test]
fn chat_history_is_capped() {
    let mut h = Harness::with_participants(&["ana"]);
    for i in 0..=CHAT_HISTORY_LIMIT {
        h.stamp("ana", Payload::Chat(ChatPayload { id: Some(format!("m{i}")), text: "x".into() }));
    }
    assert_eq!(h.state.chat.len(), CHAT_HISTORY_LIMIT);
    assert_eq!(h.state.chat[0].id, "m1");
}

#[test]
fn file_metadata_is_recorded() {
    let mut h = Harness::with_participants(&["ana"]);
    let file = FilePayload { id: None, name: " notes.pdf ".into(), size: 2048, mime_type: "application/pdf".into() };
    h.submit("ana", Payload::File(file)).expect("file");
    let shared = &h.state.files[0];
    assert_eq!(shared.name, "notes.pdf");
    assert_eq!(shared.size, 2048);
    assert_eq!(shared.uploaded_by, "name-ana");
}

#[test]
fn task_lifecycle() {
    let mut h = Harness::with_participants(&["ana", "ben"]);
    h.submit("ana", Payload::Task(TaskOp::Add { id: Some("t1".into()), text: "Read ch. 3".into() }))
        .expect("add");

    let event = h
        .submit("ben", Payload::Task(TaskOp::Toggle { task_id: "t1".into(), completed: None }))
        .expect("toggle")
        .expect("appended");
    assert_eq!(event.payload, Payload::Task(TaskOp::Toggle { task_id: "t1".into(), completed: Some(true) }));
    assert!(h.state.task("t1").is_some_and(|t| t.completed));

    h.submit("ana", Payload::Task(TaskOp::Delete { task_id: "t1".into() }))
        .expect("delete");
    assert!(h.state.tasks.is_empty());
}

#[test]
fn unknown_task_is_rejected() {
    let mut h = Harness::with_participants(&["ana"]);
    let err = h
        .submit("ana", Payload::Task(TaskOp::Toggle { task_id: "nope".into(), completed: None }))
        .expect_err("unknown task");
    assert!(matches!(err, SyncError::ValidationFailed(_)));
}

#[test]
fn reapplied_events_are_harmless() {
    let mut h = Harness::with_participants(&["ana"]);
    let event = h
        .submit("ana", Payload::Task(TaskOp::Add { id: None, text: "Quiz".into() }))
        .expect("add")
        .expect("appended");
    h.state.apply(&event);
    assert_eq!(h.state.tasks.len(), 1);
}

// =============================================================================
// NOTES, TIMER, MEDIA, PRESENCE
// =============================================================================

#[test]
fn notes_are_last_writer_wins_with_versions() {
    let mut h = Harness::with_participants(&["ana", "ben"]);
    h.submit("ana", Payload::Notes(NotesPayload { content: "draft".into(), version: 0 }))
        .expect("notes");
    let event = h
        .submit("ben", Payload::Notes(NotesPayload { content: "final".into(), version: 0 }))
        .expect("notes")
        .expect("appended");
    assert_eq!(event.payload, Payload::Notes(NotesPayload { content: "final".into(), version: 2 }));
    assert_eq!(h.state.notes, NotesSnapshot { text: "final".into(), version: 2 });

    // A stale version never rolls the notes back.
    h.stamp("ana", Payload::Notes(NotesPayload { content: "stale".into(), version: 1 }));
    assert_eq!(h.state.notes.text, "final");
}

#[test]
fn timer_start_pause_reset() {
    let mut h = Harness::with_participants(&["ana"]);
    assert_eq!(h.state.timer.remaining_at(NOW), DEFAULT_TIMER_SECS);

    let start = TimerPayload { action: TimerAction::Start, minutes: None, timer: None };
    h.submit_at("ana", Payload::Timer(start), NOW).expect("start");
    assert!(h.state.timer.running);
    assert_eq!(h.state.timer.remaining_at(NOW + 60_000), DEFAULT_TIMER_SECS - 60);

    let pause = TimerPayload { action: TimerAction::Pause, minutes: None, timer: None };
    h.submit_at("ana", Payload::Timer(pause), NOW + 100_000).expect("pause");
    assert!(!h.state.timer.running);
    assert_eq!(h.state.timer.remaining_at(NOW + 900_000), DEFAULT_TIMER_SECS - 100);

    let reset = TimerPayload { action: TimerAction::Reset, minutes: None, timer: None };
    h.submit("ana", Payload::Timer(reset)).expect("reset");
    assert_eq!(h.state.timer.remaining_secs, DEFAULT_TIMER_SECS);
}

#[test]
fn timer_set_bounds_minutes() {
    let mut h = Harness::with_participants(&["ana"]);
    let set = |minutes| Payload::Timer(TimerPayload { action: TimerAction::Set, minutes, timer: None });

    assert!(h.submit("ana", set(Some(0))).is_err());
    assert!(h.submit("ana", set(Some(MAX_TIMER_MINUTES + 1))).is_err());
    assert!(h.submit("ana", set(None)).is_err());

    h.submit("ana", set(Some(10))).expect("set");
    assert_eq!(h.state.timer.remaining_secs, 600);
    assert!(!h.state.timer.running);
}

#[test]
fn timer_does_not_go_below_zero() {
    let timer = TimerState { remaining_secs: 5, running: true, anchor_ms: NOW };
    assert_eq!(timer.remaining_at(NOW + 60_000), 0);
    assert!(!timer.is_ticking(NOW + 60_000));
    assert!(!timer.started(NOW + 60_000).running);

    let settled = timer.settled(NOW + 60_000);
    assert_eq!(settled, TimerState { remaining_secs: 0, running: false, anchor_ms: NOW + 5_000 });
    assert_eq!(timer.settled(NOW + 1_000), timer, "a ticking timer is unchanged");
}

#[test]
fn media_toggles_participant_flags() {
    let mut h = Harness::with_participants(&["ana"]);
    h.submit("ana", Payload::Media(MediaPayload { kind: MediaKind::Camera, enabled: false }))
        .expect("media");
    assert!(h.state.roster.get("ana").is_some_and(|p| !p.camera_enabled));

    let err = h
        .submit("ghost", Payload::Media(MediaPayload { kind: MediaKind::Mic, enabled: false }))
        .expect_err("not in roster");
    assert!(matches!(err, SyncError::ValidationFailed(_)));
}

#[test]
fn clients_cannot_send_presence() {
    let mut h = Harness::with_participants(&["ana"]);
    let err = h
        .submit("ana", Payload::Presence(PresenceOp::Left { participant_id: "ana".into() }))
        .expect_err("presence is server-only");
    assert!(matches!(err, SyncError::ValidationFailed(_)));
}
