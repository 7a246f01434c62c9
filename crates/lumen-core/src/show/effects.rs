//! Mode effects mapping audio features (or wall-clock time) to light targets
//!
//! Effects only compute targets. Throttling and delivery belong to the
//! director's dispatch step.

use std::f32::consts::TAU;

use crate::audio::analyzer::SpectralFeatures;
use crate::show::color::{approach_hue, lerp, wrap_hue, Rgb};
use crate::show::mode::ShowMode;

/// Hue for a dark, low-centroid sound (blue)
pub const COOL_HUE: f32 = 0.6;
/// Hue for a bright, high-centroid sound (orange-red)
pub const WARM_HUE: f32 = 0.05;

// Gains mapping 2/N-normalized band magnitudes to roughly 0-1
const RMS_GAIN: f32 = 4.0;
const BASS_GAIN: f32 = 10.0;
const MID_GAIN: f32 = 50.0;
const TREBLE_GAIN: f32 = 300.0;

/// Per-frame context handed to effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Number of light slots, resolved or not
    pub light_count: usize,
    /// Intensity 1-10
    pub intensity: u8,
}

impl FrameContext {
    /// Intensity as a 0.1-1.0 factor
    pub fn scale(&self) -> f32 {
        self.intensity as f32 / 10.0
    }
}

/// Desired appearance of one light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightTarget {
    /// Index into the show's light list
    pub index: usize,
    /// Color
    pub color: Rgb,
    /// Brightness percent (clamped again at dispatch)
    pub brightness: u8,
}

impl LightTarget {
    fn new(index: usize, color: Rgb, brightness: f32) -> Self {
        Self {
            index,
            color,
            brightness: percent(brightness),
        }
    }
}

/// A mode's mapping from audio to light targets
pub trait LightEffect: Send {
    /// Mode this effect implements
    fn mode(&self) -> ShowMode;

    /// Targets for one analysed frame
    fn on_frame(&mut self, features: &SpectralFeatures, ctx: &FrameContext) -> Vec<LightTarget>;

    /// Targets for a frame without live audio; `t` is seconds of wall-clock time
    fn on_idle(&mut self, t: f64, ctx: &FrameContext) -> Vec<LightTarget>;
}

/// Fresh effect state for `mode`; `None` for `Off`
pub fn effect_for(mode: ShowMode) -> Option<Box<dyn LightEffect>> {
    match mode {
        ShowMode::Off => None,
        ShowMode::Pulse => Some(Box::new(PulseEffect::default())),
        ShowMode::Ambient => Some(Box::new(AmbientEffect::default())),
        ShowMode::Party => Some(Box::new(PartyEffect::default())),
    }
}

fn percent(x: f32) -> u8 {
    if x.is_finite() {
        x.clamp(1.0, 100.0) as u8
    } else {
        1
    }
}

fn level(x: f32, gain: f32) -> f32 {
    (x * gain).clamp(0.0, 1.0)
}

fn centroid_hue(features: &SpectralFeatures) -> f32 {
    lerp(COOL_HUE, WARM_HUE, features.centroid_smooth.clamp(0.0, 1.0))
}

/// Position in [0, 1) of a cycle turning `rate` times per second
fn idle_phase(t: f64, rate: f64) -> f32 {
    (t * rate).rem_euclid(1.0) as f32
}

/// All lights in lock-step: beat flashes, hue from the spectral centroid
#[derive(Debug, Clone)]
pub struct PulseEffect {
    hue: f32,
    level: f32,
}

impl Default for PulseEffect {
    fn default() -> Self {
        Self {
            hue: COOL_HUE,
            level: 0.0,
        }
    }
}

impl PulseEffect {
    const MAX_BEAT_SHIFT: f32 = 0.25;
    const HUE_FOLLOW: f32 = 0.08;
    const DECAY: f32 = 0.85;
}

impl LightEffect for PulseEffect {
    fn mode(&self) -> ShowMode {
        ShowMode::Pulse
    }

    fn on_frame(&mut self, features: &SpectralFeatures, ctx: &FrameContext) -> Vec<LightTarget> {
        let scale = ctx.scale();
        let energy = level(features.rms_smooth, RMS_GAIN);

        if features.is_beat {
            let strength = (features.flux / features.flux_smooth.max(1e-6)).min(4.0);
            let shift =
                ((0.04 + 0.04 * strength) * (0.5 + 0.5 * scale)).min(Self::MAX_BEAT_SHIFT);
            self.hue = wrap_hue(self.hue + shift);
            self.level = 100.0 * scale;
        } else {
            self.hue = approach_hue(self.hue, centroid_hue(features), Self::HUE_FOLLOW);
            let floor = (60.0 * energy * scale).max(20.0);
            self.level = (self.level * Self::DECAY).max(floor);
        }

        let saturation = (0.7 + features.energy_trend * 8.0).clamp(0.4, 1.0);
        let color = Rgb::from_hsv(self.hue, saturation, 1.0);
        (0..ctx.light_count)
            .map(|i| LightTarget::new(i, color, self.level))
            .collect()
    }

    fn on_idle(&mut self, t: f64, ctx: &FrameContext) -> Vec<LightTarget> {
        // Slow breathing
        let breath = ((t * 1.5).sin() as f32 + 1.0) / 2.0;
        let color = Rgb::from_hsv(idle_phase(t, 0.02), 0.7, 1.0);
        (0..ctx.light_count)
            .map(|i| LightTarget::new(i, color, 30.0 + 40.0 * breath))
            .collect()
    }
}

/// Gentle per-band colors: lights take bass, mid and treble roles in turn
#[derive(Debug, Clone, Default)]
pub struct AmbientEffect {
    phase: f32,
}

impl LightEffect for AmbientEffect {
    fn mode(&self) -> ShowMode {
        ShowMode::Ambient
    }

    fn on_frame(&mut self, features: &SpectralFeatures, ctx: &FrameContext) -> Vec<LightTarget> {
        let scale = ctx.scale();
        let energy = level(features.rms_smooth, RMS_GAIN);
        self.phase = (self.phase + 0.02 + 0.05 * energy) % TAU;
        let drift = 0.05 * self.phase.sin();

        let bass = level(features.bass_smooth, BASS_GAIN);
        let mid = level(features.mid_smooth, MID_GAIN);
        let treble = level(features.treble_smooth, TREBLE_GAIN);

        (0..ctx.light_count)
            .map(|i| {
                let (hue, saturation, amount) = match i % 3 {
                    // Warm light follows the bass
                    0 => (lerp(0.0, 0.1, bass), 0.85, bass),
                    1 => (centroid_hue(features), 0.7, mid),
                    // Cool light follows the treble
                    _ => (lerp(0.5, 0.75, treble), 0.8, treble),
                };
                let color = Rgb::from_hsv(hue + drift, saturation, 1.0);
                LightTarget::new(i, color, 25.0 + 55.0 * amount * scale)
            })
            .collect()
    }

    fn on_idle(&mut self, t: f64, ctx: &FrameContext) -> Vec<LightTarget> {
        let base = idle_phase(t, 0.015);
        let n = ctx.light_count.max(1) as f32;
        (0..ctx.light_count)
            .map(|i| {
                let color = Rgb::from_hsv(base + i as f32 / n, 0.6, 1.0);
                LightTarget::new(i, color, 50.0)
            })
            .collect()
    }
}

/// Alternating beat flashes on a rainbow, white strobe on spikes
#[derive(Debug, Clone, Default)]
pub struct PartyEffect {
    cycle: f32,
    beat_count: u64,
}

impl PartyEffect {
    /// Weight of the centroid hue against the cycling hue
    const CENTROID_WEIGHT: f32 = 0.35;
}

impl LightEffect for PartyEffect {
    fn mode(&self) -> ShowMode {
        ShowMode::Party
    }

    fn on_frame(&mut self, features: &SpectralFeatures, ctx: &FrameContext) -> Vec<LightTarget> {
        let scale = ctx.scale();

        if features.is_spike {
            return (0..ctx.light_count)
                .map(|i| LightTarget::new(i, Rgb::WHITE, 100.0 * scale))
                .collect();
        }

        let speed = 0.005 + (features.flux_smooth * 0.01).min(0.03);
        self.cycle = wrap_hue(self.cycle + speed);
        let base = approach_hue(self.cycle, centroid_hue(features), Self::CENTROID_WEIGHT);

        let n = ctx.light_count.max(1);
        let lead = if features.is_beat {
            self.beat_count += 1;
            Some((self.beat_count % n as u64) as usize)
        } else {
            None
        };
        let energy = level(features.rms_smooth, RMS_GAIN);
        let steady = (50.0 * energy * scale).max(20.0);

        (0..ctx.light_count)
            .map(|i| {
                let color = Rgb::from_hsv(base + i as f32 / n as f32, 1.0, 1.0);
                let brightness = match lead {
                    Some(lead) if lead == i => 100.0 * scale,
                    Some(_) => 30.0 * scale,
                    None => steady,
                };
                LightTarget::new(i, color, brightness)
            })
            .collect()
    }

    fn on_idle(&mut self, t: f64, ctx: &FrameContext) -> Vec<LightTarget> {
        // Fixed 120 BPM alternation
        let n = ctx.light_count.max(1);
        let lead = ((t * 2.0).floor().max(0.0) as u64 % n as u64) as usize;
        let base = idle_phase(t, 0.05);
        let scale = ctx.scale();
        (0..ctx.light_count)
            .map(|i| {
                let color = Rgb::from_hsv(base + i as f32 / n as f32, 1.0, 1.0);
                let brightness = (if i == lead { 90.0 } else { 30.0 }) * scale;
                LightTarget::new(i, color, brightness)
            })
            .collect()
    }
}
