//! Throttled, delta-filtered light command dispatch
//!
//! Each light has its own [`LightSlot`]. A candidate (color, brightness) is
//! dropped when it is close to what the light already shows, or when the
//! light was commanded less than [`MIN_COMMAND_INTERVAL`] ago. When a send
//! does happen only the sub-commands that actually changed go out.

use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::device::LightController;
use crate::show::color::Rgb;

/// Minimum spacing of commands to one light (20 commands/s)
pub const MIN_COMMAND_INTERVAL: Duration = Duration::from_millis(50);
/// Color distance (sum of channel deltas) below which color is unchanged
pub const COLOR_THRESHOLD: u32 = 10;
/// Brightness delta (percent) below which brightness is unchanged
pub const BRIGHTNESS_THRESHOLD: u8 = 2;

/// Result of one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Light has no network address
    Unresolved,
    /// Both color and brightness are within threshold of the last send
    Unchanged,
    /// Last command was too recent
    Throttled,
    /// At least one sub-command was delivered
    Sent {
        /// Color command delivered
        color: bool,
        /// Brightness command delivered
        brightness: bool,
    },
    /// Every attempted sub-command failed
    Failed,
}

/// Per-light dispatch bookkeeping
#[derive(Debug, Clone)]
pub struct LightSlot {
    light_id: String,
    address: Option<IpAddr>,
    last_color: Option<Rgb>,
    last_brightness: Option<u8>,
    last_command: Option<Instant>,
}

impl LightSlot {
    /// Slot for `light_id`, inert when `address` is `None`
    pub fn new(light_id: impl Into<String>, address: Option<IpAddr>) -> Self {
        Self {
            light_id: light_id.into(),
            address,
            last_color: None,
            last_brightness: None,
            last_command: None,
        }
    }

    /// Abstract light id
    pub fn light_id(&self) -> &str {
        &self.light_id
    }

    /// Resolved network address
    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    /// Whether the light resolved
    pub fn is_resolved(&self) -> bool {
        self.address.is_some()
    }

    /// Last delivered color and brightness
    pub fn last_sent(&self) -> (Option<Rgb>, Option<u8>) {
        (self.last_color, self.last_brightness)
    }

    /// Forget last-sent state so the next dispatch goes out in full
    pub fn reset(&mut self) {
        self.last_color = None;
        self.last_brightness = None;
        self.last_command = None;
    }

    /// Send the changed parts of (color, brightness), subject to thresholds
    /// and the per-light interval. Brightness is clamped to 1-100.
    pub fn dispatch(
        &mut self,
        controller: &dyn LightController,
        color: Rgb,
        brightness: u8,
        now: Instant,
    ) -> DispatchOutcome {
        let Some(addr) = self.address else {
            return DispatchOutcome::Unresolved;
        };
        let brightness = brightness.clamp(1, 100);

        let color_changed = self
            .last_color
            .map_or(true, |last| last.distance(&color) >= COLOR_THRESHOLD);
        let brightness_changed = self
            .last_brightness
            .map_or(true, |last| last.abs_diff(brightness) >= BRIGHTNESS_THRESHOLD);

        if !color_changed && !brightness_changed {
            return DispatchOutcome::Unchanged;
        }

        if let Some(last) = self.last_command {
            if now.saturating_duration_since(last) < MIN_COMMAND_INTERVAL {
                return DispatchOutcome::Throttled;
            }
        }

        self.send(
            controller,
            addr,
            color_changed.then_some(color),
            brightness_changed.then_some(brightness),
            now,
        )
    }

    /// Send both color and brightness, bypassing thresholds and interval
    pub fn force(
        &mut self,
        controller: &dyn LightController,
        color: Rgb,
        brightness: u8,
        now: Instant,
    ) -> DispatchOutcome {
        let Some(addr) = self.address else {
            return DispatchOutcome::Unresolved;
        };
        self.send(controller, addr, Some(color), Some(brightness.clamp(1, 100)), now)
    }

    fn send(
        &mut self,
        controller: &dyn LightController,
        addr: IpAddr,
        color: Option<Rgb>,
        brightness: Option<u8>,
        now: Instant,
    ) -> DispatchOutcome {
        self.last_command = Some(now);

        let mut color_sent = false;
        if let Some(color) = color {
            match controller.set_color(addr, color) {
                Ok(()) => {
                    self.last_color = Some(color);
                    color_sent = true;
                }
                Err(e) => debug!(
                    "Light {} ({}): color command failed: {}",
                    self.light_id, addr, e
                ),
            }
        }

        let mut brightness_sent = false;
        if let Some(brightness) = brightness {
            match controller.set_brightness(addr, brightness) {
                Ok(()) => {
                    self.last_brightness = Some(brightness);
                    brightness_sent = true;
                }
                Err(e) => debug!(
                    "Light {} ({}): brightness command failed: {}",
                    self.light_id, addr, e
                ),
            }
        }

        if color_sent || brightness_sent {
            DispatchOutcome::Sent {
                color: color_sent,
                brightness: brightness_sent,
            }
        } else {
            DispatchOutcome::Failed
        }
    }
}
