//! Lumen Control - Device Integrations and HTTP Surface
//!
//! This crate connects the `lumen-core` engine to the outside world:
//! - **Govee**: LAN UDP discovery and control of color lights
//! - **Sonos**: SSDP discovery and AVTransport forwarding of the audio stream
//! - **Web**: endless WAV stream plus the light-show REST API (axum)
//!
//! ## Modules
//!
//! - [`govee`] - implements [`lumen_core::LightController`]
//! - [`sonos`] - implements [`lumen_core::PlaybackSink`]
//! - [`web`] - HTTP server, routes and the stream handler
//! - [`error`] - Error types

#![allow(missing_docs)]

/// Error types
pub mod error;

/// Govee LAN lights
pub mod govee;

/// Sonos forwarding
pub mod sonos;

/// HTTP server
pub mod web;

pub use error::{ControlError, Result};
pub use govee::{DiscoveredDevice, GoveeConfig, GoveeLan};
pub use sonos::{SonosConfig, SonosForwarder};
pub use web::{AppState, WebServer, WebServerConfig};
