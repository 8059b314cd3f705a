use anyhow::Result;
use async_trait::async_trait;

use crate::stt::SttSettings;

/// Notification delivered by the media runtime for a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ParticipantJoined {
        identity: String,
        name: Option<String>,
    },
    ParticipantLeft {
        identity: String,
    },
    /// An audio track from this participant became available
    AudioTrackSubscribed {
        identity: String,
    },
    /// A completed utterance from the participant's transcription session
    Utterance {
        identity: String,
        text: String,
    },
}

impl RoomEvent {
    pub fn identity(&self) -> &str {
        match self {
            Self::ParticipantJoined { identity, .. }
            | Self::ParticipantLeft { identity }
            | Self::AudioTrackSubscribed { identity }
            | Self::Utterance { identity, .. } => identity,
        }
    }
}

/// A live transcription pipeline bound to one participant
#[async_trait]
pub trait TranscriptionSession: Send + Sync {
    /// Identifier assigned by the runtime
    fn id(&self) -> &str;

    /// Drain and close the session
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Capabilities the recorder consumes from the media runtime
#[async_trait]
pub trait RoomRuntime: Send + Sync {
    /// Open a transcription session for `participant`.
    ///
    /// Completed utterances are reported back as [`RoomEvent::Utterance`].
    async fn open_transcription(
        &self,
        participant: &str,
        settings: &SttSettings,
    ) -> Result<Box<dyn TranscriptionSession>>;
}
