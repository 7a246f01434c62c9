//! Error types for the light-show engine
use thiserror::Error;

/// Engine errors
#[derive(Error, Debug)]
pub enum ShowError {
    /// Requested show mode is not one of the playable modes
    #[error("Invalid mode '{0}'. Must be one of pulse, ambient, party")]
    InvalidMode(String),

    /// A light command could not be delivered
    #[error("Device error: {0}")]
    Device(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ShowError>;
