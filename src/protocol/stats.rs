use chrono::NaiveTime;
use serde::Serialize;
use std::collections::BTreeMap;

use super::record::word_count;

/// Speaking statistics for a single participant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantStats {
    pub identity: String,
    pub name: String,
    pub joined_at: Option<NaiveTime>,
    pub left_at: Option<NaiveTime>,
    pub word_count: usize,
    pub turn_count: usize,
    pub characters: usize,
}

impl ParticipantStats {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            name: identity.to_string(),
            ..Default::default()
        }
    }

    /// Average words per turn; a participant without turns reports its raw word count
    pub fn avg_words_per_turn(&self) -> f64 {
        self.word_count as f64 / self.turn_count.max(1) as f64
    }
}

/// Statistics for a whole meeting, keyed by participant identity
#[derive(Debug, Clone, Default)]
pub struct ProtocolStats {
    pub room_name: String,
    pub started_at: Option<NaiveTime>,
    pub ended_at: Option<NaiveTime>,
    pub participants: BTreeMap<String, ParticipantStats>,
    pub total_turns: usize,
    pub total_words: usize,
}

impl ProtocolStats {
    pub fn new(room_name: &str, started_at: NaiveTime) -> Self {
        Self {
            room_name: room_name.to_string(),
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    fn participant_mut(&mut self, identity: &str) -> &mut ParticipantStats {
        self.participants
            .entry(identity.to_string())
            .or_insert_with(|| ParticipantStats::new(identity))
    }

    /// Record one speech turn
    pub fn record_speech(&mut self, identity: &str, text: &str) {
        let words = word_count(text);

        let stats = self.participant_mut(identity);
        stats.word_count += words;
        stats.turn_count += 1;
        stats.characters += text.chars().count();

        self.total_turns += 1;
        self.total_words += words;
    }

    /// First join wins; a rejoin does not move `joined_at`
    pub fn record_join(&mut self, identity: &str, at: NaiveTime) {
        let stats = self.participant_mut(identity);
        if stats.joined_at.is_none() {
            stats.joined_at = Some(at);
        }
    }

    pub fn record_leave(&mut self, identity: &str, at: NaiveTime) {
        if let Some(stats) = self.participants.get_mut(identity) {
            stats.left_at = Some(at);
        }
    }

    /// Serializable statistics artifact
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            room_name: self.room_name.clone(),
            started_at: fmt_time(self.started_at),
            ended_at: fmt_time(self.ended_at),
            duration_info: "See timestamps for duration".to_string(),
            total_participants: self.participants.len(),
            total_turns: self.total_turns,
            total_words: self.total_words,
            participants: self
                .participants
                .iter()
                .map(|(identity, p)| {
                    (
                        identity.clone(),
                        ParticipantSummary {
                            identity: p.identity.clone(),
                            name: p.name.clone(),
                            joined_at: fmt_time(p.joined_at),
                            left_at: fmt_time(p.left_at),
                            word_count: p.word_count,
                            turn_count: p.turn_count,
                            characters: p.characters,
                            avg_words_per_turn: round_one_decimal(p.avg_words_per_turn()),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Statistics artifact written next to the protocol files
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub room_name: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_info: String,
    pub total_participants: usize,
    pub total_turns: usize,
    pub total_words: usize,
    pub participants: BTreeMap<String, ParticipantSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    pub identity: String,
    pub name: String,
    pub joined_at: String,
    pub left_at: String,
    pub word_count: usize,
    pub turn_count: usize,
    pub characters: usize,
    pub avg_words_per_turn: f64,
}

fn fmt_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format(super::record::hms::FORMAT).to_string())
        .unwrap_or_default()
}

fn round_one_decimal(value: f64) -> f64 {
    // Halves go to even, matching existing stats artifacts (2.25 -> 2.2).
    (value * 10.0).round_ties_even() / 10.0
}
