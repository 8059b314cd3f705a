use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::io;

/// One immutable entry of the structured record stream.
///
/// Serialized as one JSON object per line with a `type` discriminator:
/// `header`, `footer`, `event` (lifecycle) or `transcript`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventRecord {
    Header(HeaderRecord),
    Footer(FooterRecord),
    #[serde(rename = "event")]
    Lifecycle(LifecycleRecord),
    Transcript(TranscriptRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    /// Room (session) identifier
    #[serde(alias = "session_id")]
    pub room: String,

    #[serde(with = "hms")]
    pub started_at: NaiveTime,

    pub stt_provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FooterRecord {
    #[serde(with = "hms")]
    pub ended_at: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    #[serde(with = "hms")]
    pub timestamp: NaiveTime,

    pub participant: String,

    #[serde(rename = "event")]
    pub kind: LifecycleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Joined,
    Left,
    /// Written as `idle_timeout` for compatibility with existing protocols
    #[serde(rename = "idle_timeout", alias = "idle_paused")]
    IdlePaused,
    Resumed,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Left => "left",
            Self::IdlePaused => "idle_timeout",
            Self::Resumed => "resumed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    #[serde(with = "hms")]
    pub timestamp: NaiveTime,

    pub participant: String,

    pub text: String,

    pub word_count: usize,
}

impl TranscriptRecord {
    /// Build a transcript record from raw utterance text.
    ///
    /// Returns `None` for empty or whitespace-only text.
    pub fn from_utterance(timestamp: NaiveTime, participant: &str, text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        Some(Self {
            timestamp,
            participant: participant.to_string(),
            text: text.to_string(),
            word_count: word_count(text),
        })
    }
}

/// Number of whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Collapse every whitespace run to a single space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl EventRecord {
    /// Occurrence time of the record (header: start, footer: end)
    pub fn timestamp(&self) -> NaiveTime {
        match self {
            Self::Header(h) => h.started_at,
            Self::Footer(f) => f.ended_at,
            Self::Lifecycle(e) => e.timestamp,
            Self::Transcript(t) => t.timestamp,
        }
    }

    pub fn participant(&self) -> Option<&str> {
        match self {
            Self::Lifecycle(e) => Some(&e.participant),
            Self::Transcript(t) => Some(&t.participant),
            Self::Header(_) | Self::Footer(_) => None,
        }
    }

    pub fn lifecycle(timestamp: NaiveTime, participant: &str, kind: LifecycleKind) -> Self {
        Self::Lifecycle(LifecycleRecord {
            timestamp,
            participant: participant.to_string(),
            kind,
        })
    }

    /// Serialize as a single JSON Lines entry (without the trailing newline).
    ///
    /// Output matches the existing protocol files byte for byte:
    /// `", "` / `": "` separators and non-ASCII escaped as `\uXXXX`.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut buf = Vec::with_capacity(128);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, JsonLineFormatter);
        self.serialize(&mut ser)?;
        // The formatter only ever emits ASCII.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

struct JsonLineFormatter;

impl serde_json::ser::Formatter for JsonLineFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// `HH:MM:SS` serde representation
pub mod hms {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M:%S";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
