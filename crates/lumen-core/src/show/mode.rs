//! Show modes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ShowError;

/// State of the light show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowMode {
    /// No show running
    #[default]
    Off,
    /// Lock-step beat flashes, hue from spectral centroid
    Pulse,
    /// Slow per-band colors
    Ambient,
    /// Alternating beat flashes with white strobes on spikes
    Party,
}

impl ShowMode {
    /// Modes a show can be started in
    pub const PLAYABLE: [ShowMode; 3] = [ShowMode::Pulse, ShowMode::Ambient, ShowMode::Party];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowMode::Off => "off",
            ShowMode::Pulse => "pulse",
            ShowMode::Ambient => "ambient",
            ShowMode::Party => "party",
        }
    }

    /// True for every mode except `Off`
    pub fn is_playable(&self) -> bool {
        !matches!(self, ShowMode::Off)
    }

    /// Reject `Off`, which is only reachable through `stop`
    pub fn ensure_playable(self) -> Result<Self, ShowError> {
        if self.is_playable() {
            Ok(self)
        } else {
            Err(ShowError::InvalidMode(self.as_str().to_string()))
        }
    }
}

impl fmt::Display for ShowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShowMode {
    type Err = ShowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(ShowMode::Off),
            "pulse" => Ok(ShowMode::Pulse),
            "ambient" => Ok(ShowMode::Ambient),
            "party" => Ok(ShowMode::Party),
            _ => Err(ShowError::InvalidMode(s.to_string())),
        }
    }
}
