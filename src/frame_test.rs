use super::*;
use crate::error::SyncError;
use serde_json::json;

#[test]
fn new_sets_timestamp_and_no_seq() {
    let envelope = Envelope::new(MessageType::Ping, Data::new());
    assert_eq!(envelope.kind, MessageType::Ping);
    assert!(envelope.timestamp > 0);
    assert!(envelope.seq.is_none());
    assert!(envelope.room_code.is_empty());
}

#[test]
fn wire_shape_is_camel_case() {
    let mut envelope = Envelope::new(MessageType::Chat, Data::new())
        .with_room("ABC123")
        .with_user("p-1", "Ana")
        .with_data("text", "hi");
    envelope.seq = Some(7);

    let value = serde_json::to_value(&envelope).expect("serialize");
    assert_eq!(value["type"], "chat");
    assert_eq!(value["roomCode"], "ABC123");
    assert_eq!(value["userId"], "p-1");
    assert_eq!(value["userName"], "Ana");
    assert_eq!(value["data"]["text"], "hi");
    assert_eq!(value["seq"], 7);
}

#[test]
fn seq_is_omitted_when_absent() {
    let envelope = Envelope::new(MessageType::Pong, Data::new());
    let value = serde_json::to_value(&envelope).expect("serialize");
    assert!(value.get("seq").is_none());
}

#[test]
fn minimal_client_envelope_parses() {
    let envelope: Envelope =
        serde_json::from_value(json!({"type": "join", "data": {"roomCode": "abc123"}})).expect("deserialize");
    assert_eq!(envelope.kind, MessageType::Join);
    assert_eq!(envelope.data_str("roomCode"), Some("abc123"));
    assert!(envelope.user_id.is_empty());
    assert_eq!(envelope.timestamp, 0);
}

#[test]
fn unknown_type_is_rejected() {
    let result = serde_json::from_value::<Envelope>(json!({"type": "cursor"}));
    assert!(result.is_err());
}

#[test]
fn error_from_carries_code_and_message() {
    let envelope = Envelope::error_from("ABC123", &SyncError::RoomNotFound("ABC123".into()));
    assert_eq!(envelope.kind, MessageType::Error);
    assert_eq!(envelope.room_code, "ABC123");
    assert_eq!(envelope.data_str(FRAME_CODE), Some("E_ROOM_NOT_FOUND"));
    assert_eq!(envelope.data_str(FRAME_MESSAGE), Some("room not found: ABC123"));
    assert_eq!(envelope.data.get(FRAME_RETRYABLE), Some(&json!(false)));
}

#[test]
fn with_payload_flattens_objects_and_wraps_scalars() {
    #[derive(Serialize)]
    struct Hello {
        name: &'static str,
    }
    let envelope = Envelope::with_payload(MessageType::Session, &Hello { name: "Ana" });
    assert_eq!(envelope.data_str("name"), Some("Ana"));

    let envelope = Envelope::with_payload(MessageType::Session, &42);
    assert_eq!(envelope.data.get("value"), Some(&json!(42)));
}

#[test]
fn decode_data_reads_typed_payload() {
    #[derive(serde::Deserialize)]
    struct Join {
        #[serde(rename = "roomCode")]
        room_code: String,
    }
    let envelope = Envelope::new(MessageType::Join, Data::new()).with_data("roomCode", "XYZ789");
    let join: Join = envelope.decode_data().expect("decode");
    assert_eq!(join.room_code, "XYZ789");
}

#[test]
fn event_kinds_map_both_ways() {
    for kind in [
        EventKind::Draw,
        EventKind::Clear,
        EventKind::Chat,
        EventKind::File,
        EventKind::Task,
        EventKind::Notes,
        EventKind::Timer,
        EventKind::Media,
        EventKind::Presence,
    ] {
        assert_eq!(MessageType::from(kind).event_kind(), Some(kind));
    }
    assert_eq!(MessageType::Ping.event_kind(), None);
    assert_eq!(MessageType::Snapshot.event_kind(), None);
}
