//! Engine configuration sections
//!
//! Every section deserializes with defaults so a partial (or empty) config
//! file yields a working engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

use crate::error::{Result, ShowError};
use crate::show::mode::ShowMode;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default level directive (`trace`, `debug`, `info`, `warn`, `error`)
    pub level: String,
    /// Write log lines to stderr
    pub console_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
        }
    }
}

impl LogConfig {
    /// Parse the configured level, falling back to INFO when unrecognized
    pub fn parse_level(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }
}

/// PCM source reader configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// Named pipe the audio producer writes raw PCM into
    pub pipe_path: PathBuf,
    /// Delay before retrying after a read error or disconnect
    pub reconnect_backoff_ms: u64,
    /// Poll interval while the source is missing (drives idle patterns)
    pub idle_poll_ms: u64,
    /// How long playback forwarding survives an end-of-stream
    pub eof_grace_ms: u64,
    /// Chunks to buffer after a cold connect before starting forwarding
    pub prebuffer_chunks: usize,
    /// Maximum analysis frames per second
    pub analysis_rate_hz: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pipe_path: PathBuf::from("/tmp/librespot-pipe"),
            reconnect_backoff_ms: 1000,
            idle_poll_ms: 500,
            eof_grace_ms: 8000,
            prebuffer_chunks: 20,
            analysis_rate_hz: 30,
        }
    }
}

impl SourceConfig {
    /// Backoff between reconnect attempts
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Idle poll interval
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// End-of-stream grace period
    pub fn eof_grace(&self) -> Duration {
        Duration::from_millis(self.eof_grace_ms)
    }

    /// Reject settings the reader cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipe_path.as_os_str().is_empty() {
            return Err(ShowError::Config("source.pipe_path is empty".to_string()));
        }
        if self.analysis_rate_hz == 0 {
            return Err(ShowError::Config(
                "source.analysis_rate_hz must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum spacing between two analysed frames
    pub fn analysis_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.analysis_rate_hz.max(1) as f64)
    }
}

/// Defaults applied by callers that start a show without every parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShowDefaults {
    /// Mode used when none is given
    pub mode: ShowMode,
    /// Intensity 1-10
    pub intensity: i64,
    /// Latency compensation in milliseconds
    pub latency_ms: i64,
}

impl Default for ShowDefaults {
    fn default() -> Self {
        Self {
            mode: ShowMode::Pulse,
            intensity: 7,
            latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        let mut config = LogConfig::default();
        assert_eq!(config.parse_level(), LevelFilter::INFO);

        config.level = "debug".to_string();
        assert_eq!(config.parse_level(), LevelFilter::DEBUG);

        config.level = "loud".to_string();
        assert_eq!(config.parse_level(), LevelFilter::INFO);
    }

    #[test]
    fn test_source_defaults() {
        let config = SourceConfig::default();
        assert_eq!(config.eof_grace(), Duration::from_secs(8));
        assert_eq!(config.prebuffer_chunks, 20);
        let period = config.analysis_period();
        assert!(period > Duration::from_millis(33) && period < Duration::from_millis(34));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SourceConfig = toml::from_str("eof_grace_ms = 2000").unwrap();
        assert_eq!(config.eof_grace_ms, 2000);
        assert_eq!(config.reconnect_backoff_ms, 1000);
        assert_eq!(config.pipe_path, PathBuf::from("/tmp/librespot-pipe"));
    }

    #[test]
    fn test_validate_rejects_unusable_source() {
        assert!(SourceConfig::default().validate().is_ok());

        let no_pipe = SourceConfig {
            pipe_path: PathBuf::new(),
            ..Default::default()
        };
        assert!(matches!(no_pipe.validate(), Err(ShowError::Config(_))));

        let no_rate = SourceConfig {
            analysis_rate_hz: 0,
            ..Default::default()
        };
        assert!(matches!(
            no_rate.validate(),
            Err(ShowError::Config(ref m)) if m.contains("analysis_rate_hz")
        ));
    }

    #[test]
    fn test_zero_rate_does_not_divide_by_zero() {
        let config = SourceConfig {
            analysis_rate_hz: 0,
            ..Default::default()
        };
        assert_eq!(config.analysis_period(), Duration::from_secs(1));
    }
}
