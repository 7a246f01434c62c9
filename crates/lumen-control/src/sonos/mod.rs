//! Sonos speaker discovery and AVTransport control

pub mod discovery;
pub mod forwarder;
pub mod soap;

pub use discovery::Speaker;
pub use forwarder::{SonosConfig, SonosForwarder};
