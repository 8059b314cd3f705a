use serde::{Deserialize, Serialize};

use crate::session::RoomEvent;
use crate::stt::SttSettings;

/// Room notification published by the media runtime on `room.<room>.events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomEventMessage {
    ParticipantConnected {
        identity: String,
        #[serde(default)]
        name: Option<String>,
    },
    ParticipantDisconnected {
        identity: String,
    },
    TrackSubscribed {
        identity: String,
        track_kind: String,
    },
}

impl RoomEventMessage {
    /// Map to a room event; non-audio tracks are ignored
    pub fn into_room_event(self) -> Option<RoomEvent> {
        match self {
            Self::ParticipantConnected { identity, name } => {
                Some(RoomEvent::ParticipantJoined { identity, name })
            }
            Self::ParticipantDisconnected { identity } => Some(RoomEvent::ParticipantLeft { identity }),
            Self::TrackSubscribed {
                identity,
                track_kind,
            } => track_kind
                .eq_ignore_ascii_case("audio")
                .then_some(RoomEvent::AudioTrackSubscribed { identity }),
        }
    }
}

/// Transcript message received from the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Transcription session control published to the STT service
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionControlMessage {
    Open {
        session_id: String,
        room: String,
        participant: String,
        settings: SttSettings,
    },
    Close {
        session_id: String,
    },
}
