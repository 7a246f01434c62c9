//! Collaborator interfaces consumed by the engine
//!
//! The engine never talks to the network directly. Light control and
//! playback forwarding are provided by implementations of these traits
//! (see `lumen-control`), which keeps the director and reader testable with
//! in-memory recorders.

use futures::future::BoxFuture;
use std::net::IpAddr;

use crate::show::color::Rgb;
use crate::Result;

/// Discovery and control of networked color lights.
///
/// All commands are fire-and-forget; an `Err` only means the command could
/// not be handed to the network.
pub trait LightController: Send + Sync {
    /// Resolve an abstract light id to a network address.
    ///
    /// `None` is the normal outcome for a light that is not discoverable.
    fn resolve_address(&self, light_id: &str) -> Option<IpAddr>;

    /// Switch the light on
    fn turn_on(&self, addr: IpAddr) -> Result<()>;

    /// Set the RGB color
    fn set_color(&self, addr: IpAddr, color: Rgb) -> Result<()>;

    /// Set brightness in percent (1-100)
    fn set_brightness(&self, addr: IpAddr, percent: u8) -> Result<()>;
}

/// A speaker that can be told to play the engine's audio stream.
pub trait PlaybackSink: Send + Sync {
    /// Start playing from `stream_url`. Returns `true` when the sink accepted it.
    fn start_forwarding<'a>(&'a self, stream_url: &'a str) -> BoxFuture<'a, bool>;

    /// Stop playback
    fn stop_forwarding(&self) -> BoxFuture<'_, ()>;
}
