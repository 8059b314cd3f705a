use protocol_recorder::nats::messages::{RoomEventMessage, SessionControlMessage, TranscriptMessage};
use protocol_recorder::{RoomEvent, SttProvider};

#[test]
fn test_room_event_deserialization() {
    let json = r#"{"kind": "participant_connected", "identity": "alice", "name": "Alice"}"#;
    let msg: RoomEventMessage = serde_json::from_str(json).unwrap();

    assert_eq!(
        msg.into_room_event(),
        Some(RoomEvent::ParticipantJoined {
            identity: "alice".to_string(),
            name: Some("Alice".to_string()),
        })
    );

    let json = r#"{"kind": "participant_disconnected", "identity": "alice"}"#;
    let msg: RoomEventMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        msg.into_room_event(),
        Some(RoomEvent::ParticipantLeft {
            identity: "alice".to_string()
        })
    );
}

#[test]
fn test_only_audio_tracks_are_forwarded() {
    let audio: RoomEventMessage =
        serde_json::from_str(r#"{"kind": "track_subscribed", "identity": "bob", "track_kind": "audio"}"#).unwrap();
    let video: RoomEventMessage =
        serde_json::from_str(r#"{"kind": "track_subscribed", "identity": "bob", "track_kind": "video"}"#).unwrap();

    assert_eq!(
        audio.into_room_event(),
        Some(RoomEvent::AudioTrackSubscribed {
            identity: "bob".to_string()
        })
    );
    assert_eq!(video.into_room_event(), None);
}

#[test]
fn test_transcript_deserialization() {
    let json = r#"{
        "session_id": "9b7c",
        "text": "Hello world",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.95
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.session_id, "9b7c");
    assert_eq!(msg.text, "Hello world");
    assert!(!msg.partial);
    assert_eq!(msg.confidence, Some(0.95));
}

#[test]
fn test_session_open_carries_provider_settings() {
    let msg = SessionControlMessage::Open {
        session_id: "9b7c".to_string(),
        room: "standup".to_string(),
        participant: "alice".to_string(),
        settings: SttProvider::Deepgram.settings("de"),
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"action\":\"open\""));
    assert!(json.contains("\"provider\":\"deepgram\""));
    assert!(json.contains("\"model\":\"nova-3\""));
    assert!(json.contains("\"endpointing_ms\":500"));

    let close = serde_json::to_string(&SessionControlMessage::Close {
        session_id: "9b7c".to_string(),
    })
    .unwrap();
    assert_eq!(close, r#"{"action":"close","session_id":"9b7c"}"#);
}
