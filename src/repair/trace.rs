//! Diagnostic trace grammar
//!
//! Recovers records from recorder log lines such as
//! `2026-01-29 23:12:04,794 - protocol-agent - INFO - [23:12:04] Stefan: So I'll stop.`
//! and `2026-01-29 23:12:04,564 - protocol-agent - INFO - Participant disconnected: Michael`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};

use crate::protocol::{collapse_whitespace, hms, word_count, EventRecord, LifecycleKind, TranscriptRecord};

/// A record recovered from one trace line, with the full time the line was logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub logged_at: NaiveDateTime,
    pub record: EventRecord,
}

pub struct TraceParser {
    transcript: Regex,
    lifecycle: Regex,
}

impl TraceParser {
    /// Parser for lines written by the logger named `logger`
    pub fn new(logger: &str) -> Result<Self, regex::Error> {
        let prefix = format!(
            r"^(\d{{4}}-\d{{2}}-\d{{2}}) (\d{{2}}:\d{{2}}:\d{{2}}),\d+ - {} - INFO - ",
            regex::escape(logger)
        );

        Ok(Self {
            transcript: Regex::new(&format!(r"{prefix}\[(\d{{2}}:\d{{2}}:\d{{2}})\] ([^:]+): (.*)$"))?,
            lifecycle: Regex::new(&format!(r"{prefix}Participant (connected|disconnected): (.*)$"))?,
        })
    }

    /// Parse one line; lines matching neither grammar yield `None`
    pub fn parse_line(&self, line: &str) -> Option<TraceEntry> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(caps) = self.transcript.captures(line) {
            let logged_at = logged_at(&caps)?;
            let timestamp = NaiveTime::parse_from_str(&caps[3], hms::FORMAT).ok()?;
            let participant = caps[4].trim();
            let text = collapse_whitespace(&caps[5]);
            if participant.is_empty() || text.is_empty() {
                return None;
            }

            return Some(TraceEntry {
                logged_at,
                record: EventRecord::Transcript(TranscriptRecord {
                    timestamp,
                    participant: participant.to_string(),
                    word_count: word_count(&text),
                    text,
                }),
            });
        }

        if let Some(caps) = self.lifecycle.captures(line) {
            let logged_at = logged_at(&caps)?;
            let kind = match &caps[3] {
                "connected" => LifecycleKind::Joined,
                _ => LifecycleKind::Left,
            };
            let participant = caps[4].trim();
            if participant.is_empty() {
                return None;
            }

            return Some(TraceEntry {
                logged_at,
                record: EventRecord::lifecycle(logged_at.time(), participant, kind),
            });
        }

        None
    }
}

fn logged_at(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(&caps[2], hms::FORMAT).ok()?;
    Some(date.and_time(time))
}
