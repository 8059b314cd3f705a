use std::time::Duration;

use crate::config::ProtocolConfig;
use crate::stt::SttSettings;

/// Configuration for the session supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Group silence after which all sessions are paused; `None` disables idle suspension
    pub idle_timeout: Option<Duration>,

    /// How often the idle check runs
    /// Default: 60 seconds
    pub idle_check_interval: Duration,

    /// Settings handed to the runtime for every transcription session
    pub stt: SttSettings,

    /// Upper bound for in-flight session operations during shutdown
    /// Default: 10 seconds
    pub shutdown_grace: Duration,
}

impl SupervisorConfig {
    pub fn new(stt: SttSettings) -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(5 * 60)),
            idle_check_interval: Duration::from_secs(60),
            stt,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl From<&ProtocolConfig> for SupervisorConfig {
    fn from(config: &ProtocolConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            ..Self::new(config.stt_provider.settings(&config.stt_language))
        }
    }
}
