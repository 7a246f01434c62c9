//! Lumen Core - Audio-Reactive Light-Show Engine
//!
//! This crate contains the real-time core of Lumen:
//! - Broadcast audio buffer fanning PCM chunks out to independent subscribers
//! - Persistent PCM source reader that keeps the upstream pipe drained
//! - Spectral analyzer (band energies, flux, centroid, trend, beat/spike events)
//! - Light-show director (off / pulse / ambient / party state machine)
//! - Throttled per-light command dispatch
//!
//! Network integrations (lights, speakers, HTTP) live in `lumen-control` and
//! plug in through the traits in [`device`].

#![warn(missing_docs)]

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod show;

// --- Re-exports grouped by category ---

// Audio pipeline
pub use audio::analyzer::{AnalyzerConfig, BeatDetector, BeatEvent, SpectralAnalyzer, SpectralFeatures};
pub use audio::buffer::{AudioChunk, BroadcastBuffer, Subscription, SubscriptionId};
pub use audio::reader::{Forwarding, SourceReader};
pub use audio::source::{FifoSource, PcmSource};

// Collaborator interfaces
pub use device::{LightController, PlaybackSink};

// Light show
pub use show::color::Rgb;
pub use show::director::{Director, ShowStatus, MAX_LATENCY_MS};
pub use show::mode::ShowMode;

// Configuration & errors
pub use config::{LogConfig, ShowDefaults, SourceConfig};
pub use error::{Result, ShowError};
