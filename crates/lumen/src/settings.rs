//! Application configuration file
//!
//! One TOML file with a section per subsystem. Every section has defaults,
//! so an empty file (or no file at all) gives a working setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use lumen_control::{GoveeConfig, SonosConfig, WebServerConfig};
use lumen_core::{LogConfig, ShowDefaults, SourceConfig};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "LUMEN_CONFIG";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub source: SourceConfig,
    pub stream: WebServerConfig,
    pub govee: GoveeConfig,
    pub sonos: SonosConfig,
    pub show: ShowDefaults,
}

impl AppConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Parse and validate config text
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.source.validate()?;
        Ok(config)
    }

    /// Config path from the first argument, else `LUMEN_CONFIG`
    pub fn locate(
        mut args: impl Iterator<Item = String>,
        env: Option<String>,
    ) -> Option<PathBuf> {
        args.next()
            .or(env)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Load from the located file, or defaults when none is given
    pub fn from_env() -> Result<(Self, Option<PathBuf>)> {
        let path = Self::locate(std::env::args().skip(1), std::env::var(CONFIG_ENV).ok());
        match path {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }
}
