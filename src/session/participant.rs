use chrono::NaiveTime;
use tokio::time::Instant;

use super::runtime::TranscriptionSession;
use crate::protocol::TranscriptRecord;

/// Lifecycle state of a tracked participant (untracked participants are absent)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Paused by group idle suspension
    Idle,
}

/// Per-participant bookkeeping, kept from join until leave
pub struct ParticipantSession {
    pub identity: String,
    pub name: String,
    pub state: SessionState,
    pub last_speech_time: Instant,
    pub word_count: usize,
    pub turn_count: usize,
    pub character_count: usize,
    pub joined_at: NaiveTime,
    pub left_at: Option<NaiveTime>,

    /// Live transcription session, if one is established
    pub(crate) transcription: Option<Box<dyn TranscriptionSession>>,

    /// A session open is in flight
    pub(crate) opening: bool,
}

impl ParticipantSession {
    pub fn new(identity: &str, name: &str, joined_at: NaiveTime, now: Instant) -> Self {
        Self {
            identity: identity.to_string(),
            name: name.to_string(),
            state: SessionState::Active,
            last_speech_time: now,
            word_count: 0,
            turn_count: 0,
            character_count: 0,
            joined_at,
            left_at: None,
            transcription: None,
            opening: false,
        }
    }

    pub fn record_speech(&mut self, record: &TranscriptRecord, now: Instant) {
        self.last_speech_time = now;
        self.word_count += record.word_count;
        self.turn_count += 1;
        self.character_count += record.text.chars().count();
    }

    pub fn has_transcription(&self) -> bool {
        self.transcription.is_some()
    }

    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            identity: self.identity.clone(),
            name: self.name.clone(),
            state: self.state,
            word_count: self.word_count,
            turn_count: self.turn_count,
            character_count: self.character_count,
            joined_at: self.joined_at,
            has_transcription: self.has_transcription(),
        }
    }
}

/// Read-only view of a tracked participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    pub identity: String,
    pub name: String,
    pub state: SessionState,
    pub word_count: usize,
    pub turn_count: usize,
    pub character_count: usize,
    pub joined_at: NaiveTime,
    pub has_transcription: bool,
}
