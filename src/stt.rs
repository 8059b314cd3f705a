//! Speech-to-text provider selection
//!
//! The recorder never runs speech recognition itself. It only picks one of a
//! closed set of providers at configuration time and hands the resulting
//! settings to the runtime whenever a transcription session is opened.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    #[default]
    Deepgram,
    Speechmatics,
    #[serde(rename = "openai")]
    OpenAi,
}

impl SttProvider {
    /// Parse a configured provider name; unknown names fall back to Deepgram with a warning
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "deepgram" => Self::Deepgram,
            "speechmatics" => Self::Speechmatics,
            "openai" => Self::OpenAi,
            other => {
                warn!("Unknown STT provider '{}', defaulting to 'deepgram'", other);
                Self::Deepgram
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deepgram => "deepgram",
            Self::Speechmatics => "speechmatics",
            Self::OpenAi => "openai",
        }
    }

    /// Session settings for this provider
    pub fn settings(&self, language: &str) -> SttSettings {
        let base = SttSettings {
            provider: *self,
            language: language.to_string(),
            model: None,
            smart_format: false,
            no_delay: false,
            endpointing_ms: None,
            operating_point: None,
            enable_entities: false,
        };

        match self {
            // Tuned for fast turn-taking in live meetings
            Self::Deepgram => SttSettings {
                model: Some("nova-3".to_string()),
                smart_format: true,
                no_delay: true,
                endpointing_ms: Some(500),
                ..base
            },
            Self::Speechmatics => SttSettings {
                operating_point: Some("enhanced".to_string()),
                enable_entities: true,
                ..base
            },
            Self::OpenAi => base,
        }
    }
}

impl fmt::Display for SttProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider settings sent along when a transcription session is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SttSettings {
    pub provider: SttProvider,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub smart_format: bool,
    pub no_delay: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpointing_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_point: Option<String>,
    pub enable_entities: bool,
}
