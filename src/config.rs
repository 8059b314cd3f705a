use anyhow::Result;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::stt::SttProvider;

/// Which sinks a protocol store writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Txt,
    Json,
    #[default]
    Both,
}

impl OutputFormat {
    /// Parse a configured value; unknown values fall back to `both` with a warning
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "txt" => Self::Txt,
            "json" => Self::Json,
            "both" => Self::Both,
            other => {
                warn!("Unknown output format '{}', defaulting to 'both'", other);
                Self::Both
            }
        }
    }

    pub fn writes_text(&self) -> bool {
        matches!(self, Self::Txt | Self::Both)
    }

    pub fn writes_records(&self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Txt => "txt",
            Self::Json => "json",
            Self::Both => "both",
        })
    }
}

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub stt_provider: SttProvider,

    /// Language code handed to the STT provider ("de", "en", "multi", ...)
    pub stt_language: String,

    pub output_format: OutputFormat,

    /// Directory receiving protocol files
    pub protocols_dir: PathBuf,

    pub enable_statistics: bool,

    /// Pause transcription after this many minutes of group silence (0 disables)
    pub idle_timeout_minutes: u64,

    pub nats_url: String,

    pub debug: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            stt_provider: SttProvider::default(),
            stt_language: "de".to_string(),
            output_format: OutputFormat::default(),
            protocols_dir: PathBuf::from("protocols"),
            enable_statistics: true,
            idle_timeout_minutes: 5,
            nats_url: "nats://localhost:4222".to_string(),
            debug: false,
        }
    }
}

/// Raw key/value view; every value is read as a string and validated afterwards
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    stt_provider: Option<String>,
    stt_language: Option<String>,
    output_format: Option<String>,
    protocols_dir: Option<String>,
    enable_statistics: Option<String>,
    idle_timeout_minutes: Option<String>,
    nats_url: Option<String>,
    debug: Option<String>,
}

impl ProtocolConfig {
    /// Load from an optional config file overlaid by environment variables
    /// (`STT_PROVIDER`, `OUTPUT_FORMAT`, `PROTOCOLS_DIR`, ...).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder.add_source(config::Environment::default()).build()?;

        Ok(Self::from_raw(settings.try_deserialize()?))
    }

    /// Build from explicit key/value pairs (lower-case keys)
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(key, value)?;
        }

        Ok(Self::from_raw(builder.build()?.try_deserialize()?))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let defaults = Self::default();

        let idle_timeout_minutes = match raw.idle_timeout_minutes {
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                warn!(
                    "Invalid idle timeout '{}', defaulting to {} minutes",
                    value, defaults.idle_timeout_minutes
                );
                defaults.idle_timeout_minutes
            }),
            None => defaults.idle_timeout_minutes,
        };

        Self {
            stt_provider: raw
                .stt_provider
                .map(|v| SttProvider::parse_or_default(&v))
                .unwrap_or(defaults.stt_provider),
            stt_language: raw.stt_language.unwrap_or(defaults.stt_language),
            output_format: raw
                .output_format
                .map(|v| OutputFormat::parse_or_default(&v))
                .unwrap_or(defaults.output_format),
            protocols_dir: raw
                .protocols_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.protocols_dir),
            enable_statistics: raw
                .enable_statistics
                .map(|v| is_true(&v))
                .unwrap_or(defaults.enable_statistics),
            idle_timeout_minutes,
            nats_url: raw.nats_url.unwrap_or(defaults.nats_url),
            debug: raw.debug.map(|v| is_true(&v)).unwrap_or(defaults.debug),
        }
    }

    /// Idle timeout as a duration, `None` when idle suspension is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_minutes > 0).then(|| Duration::from_secs(self.idle_timeout_minutes * 60))
    }
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
