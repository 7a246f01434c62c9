//! Light-show director
//!
//! Owns the single show state of the process behind one lock. Configuration
//! calls (`start`, `stop`, `set_mode`, ...) and per-frame dispatch take the
//! same lock, so a mode change lands either before or after a frame, never
//! in the middle of one.

use parking_lot::Mutex;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::audio::analyzer::{AnalyzerConfig, SpectralAnalyzer};
use crate::device::LightController;
use crate::error::Result;
use crate::show::color::Rgb;
use crate::show::dispatch::LightSlot;
use crate::show::effects::{effect_for, FrameContext, LightEffect, LightTarget};
use crate::show::mode::ShowMode;

/// Brightness of the idle appearance left behind by `stop`
pub const IDLE_BRIGHTNESS: u8 = 50;
/// Lowest intensity
pub const MIN_INTENSITY: u8 = 1;
/// Highest intensity
pub const MAX_INTENSITY: u8 = 10;
/// Intensity a new director starts with
pub const DEFAULT_INTENSITY: u8 = 7;
/// Largest latency compensation in milliseconds
pub const MAX_LATENCY_MS: u64 = 5000;

/// Consistent snapshot of the show, taken under the state lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowStatus {
    /// A show is running in a playable mode
    pub active: bool,
    /// Current mode
    pub mode: ShowMode,
    /// Latency compensation in milliseconds
    pub latency_ms: u64,
    /// Intensity 1-10
    pub intensity: u8,
    /// Lights with a resolved address
    pub lights_connected: usize,
    /// The audio source exists
    pub source_exists: bool,
    /// The reader holds a live connection to the audio source
    pub source_connected: bool,
}

struct ShowState {
    mode: ShowMode,
    running: bool,
    latency_ms: u64,
    intensity: u8,
    slots: Vec<LightSlot>,
    effect: Option<Box<dyn LightEffect>>,
    analyzer: SpectralAnalyzer,
    source_exists: bool,
    source_connected: bool,
}

impl ShowState {
    fn is_active(&self) -> bool {
        self.running && self.mode.is_playable()
    }

    fn context(&self) -> FrameContext {
        FrameContext {
            light_count: self.slots.len(),
            intensity: self.intensity,
        }
    }

    fn reset_continuous(&mut self) {
        self.effect = effect_for(self.mode);
        self.analyzer.reset();
    }
}

/// Audio-reactive light show state machine
pub struct Director {
    controller: Arc<dyn LightController>,
    state: Mutex<ShowState>,
}

impl Director {
    /// Director with default analyzer tuning
    pub fn new(controller: Arc<dyn LightController>) -> Self {
        Self::with_analyzer_config(controller, AnalyzerConfig::default())
    }

    /// Director with custom analyzer tuning
    pub fn with_analyzer_config(
        controller: Arc<dyn LightController>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            controller,
            state: Mutex::new(ShowState {
                mode: ShowMode::Off,
                running: false,
                latency_ms: 0,
                intensity: DEFAULT_INTENSITY,
                slots: Vec::new(),
                effect: None,
                analyzer: SpectralAnalyzer::new(config),
                source_exists: false,
                source_connected: false,
            }),
        }
    }

    /// Start a show, stopping any running one first.
    ///
    /// `Off` is rejected and leaves the state untouched. Lights that do not
    /// resolve stay in the list as inert slots.
    pub fn start(
        &self,
        mode: ShowMode,
        light_ids: &[String],
        latency_ms: i64,
        intensity: i64,
    ) -> Result<()> {
        let mode = mode.ensure_playable()?;

        // Discovery can block on a network scan; keep it outside the lock
        let slots: Vec<LightSlot> = light_ids
            .iter()
            .map(|id| {
                let address = self.controller.resolve_address(id);
                match address {
                    Some(addr) => info!("Light show: resolved {} -> {}", id, addr),
                    None => warn!("Light show: could not resolve address for {}", id),
                }
                LightSlot::new(id.clone(), address)
            })
            .collect();

        let mut state = self.state.lock();
        if state.running {
            self.reset_lights(&mut state.slots);
        }

        state.slots = slots;
        state.latency_ms = clamp_latency(latency_ms);
        state.intensity = clamp_intensity(intensity);

        for slot in &state.slots {
            if let Some(addr) = slot.address() {
                if let Err(e) = self.controller.turn_on(addr) {
                    warn!("Failed to turn on light at {}: {}", addr, e);
                }
            }
        }

        state.mode = mode;
        state.reset_continuous();
        state.running = true;

        info!(
            "Light show started: mode={}, lights={}/{}",
            mode,
            state.slots.iter().filter(|s| s.is_resolved()).count(),
            state.slots.len()
        );
        Ok(())
    }

    /// Parse `mode` and [`start`](Self::start)
    pub fn start_named(
        &self,
        mode: &str,
        light_ids: &[String],
        latency_ms: i64,
        intensity: i64,
    ) -> Result<()> {
        self.start(mode.parse()?, light_ids, latency_ms, intensity)
    }

    /// Stop the show and leave every resolved light warm white at half
    /// brightness. Safe to call at any time.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.reset_lights(&mut state.slots);
        state.mode = ShowMode::Off;
        state.effect = None;
        info!("Light show stopped");
    }

    /// Switch mode without re-resolving lights; continuous state restarts
    pub fn set_mode(&self, mode: ShowMode) -> Result<()> {
        let mode = mode.ensure_playable()?;
        let mut state = self.state.lock();
        state.mode = mode;
        state.reset_continuous();
        info!("Light show mode changed to {}", mode);
        Ok(())
    }

    /// Set latency compensation, clamped to 0..=[`MAX_LATENCY_MS`]
    pub fn set_latency(&self, ms: i64) -> u64 {
        let mut state = self.state.lock();
        state.latency_ms = clamp_latency(ms);
        debug!("Light show latency set to {} ms", state.latency_ms);
        state.latency_ms
    }

    /// Set intensity, clamped to 1-10
    pub fn set_intensity(&self, level: i64) -> u8 {
        let mut state = self.state.lock();
        state.intensity = clamp_intensity(level);
        debug!("Light show intensity set to {}", state.intensity);
        state.intensity
    }

    /// Snapshot for status reporting
    pub fn status(&self) -> ShowStatus {
        let state = self.state.lock();
        ShowStatus {
            active: state.is_active(),
            mode: state.mode,
            latency_ms: state.latency_ms,
            intensity: state.intensity,
            lights_connected: state.slots.iter().filter(|s| s.is_resolved()).count(),
            source_exists: state.source_exists,
            source_connected: state.source_connected,
        }
    }

    /// A show is running in a playable mode
    pub fn is_active(&self) -> bool {
        self.state.lock().is_active()
    }

    /// Current latency compensation
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.state.lock().latency_ms)
    }

    /// Record what the reader knows about the audio source
    pub fn set_source_state(&self, exists: bool, connected: bool) {
        let mut state = self.state.lock();
        state.source_exists = exists;
        state.source_connected = connected;
    }

    /// Forget inter-frame analysis state (after a source reconnect)
    pub fn reset_analysis(&self) {
        self.state.lock().analyzer.reset();
    }

    /// Analyze one full PCM frame and drive the lights.
    ///
    /// Returns `false` without touching the analyzer when no show is active.
    pub fn process_frame(&self, pcm: &[u8], now: Instant) -> bool {
        let mut state = self.state.lock();
        if !state.is_active() {
            return false;
        }

        let ctx = state.context();
        let features = state.analyzer.analyze(pcm);
        let targets = match state.effect.as_mut() {
            Some(effect) => effect.on_frame(&features, &ctx),
            None => return false,
        };
        self.apply(&mut state.slots, &targets, now);
        true
    }

    /// Drive one frame of the mode's time-based pattern.
    ///
    /// `t` is wall-clock seconds; only its fractional motion matters.
    pub fn drive_idle(&self, now: Instant, t: f64) {
        let mut state = self.state.lock();
        if !state.is_active() {
            return;
        }

        let ctx = state.context();
        let targets = match state.effect.as_mut() {
            Some(effect) => effect.on_idle(t, &ctx),
            None => return,
        };
        self.apply(&mut state.slots, &targets, now);
    }

    /// Last delivered (color, brightness) of light `index`
    pub fn last_sent(&self, index: usize) -> Option<(Option<Rgb>, Option<u8>)> {
        self.state.lock().slots.get(index).map(LightSlot::last_sent)
    }

    /// Resolved addresses of the current light list, in order
    pub fn light_addresses(&self) -> Vec<Option<IpAddr>> {
        self.state.lock().slots.iter().map(LightSlot::address).collect()
    }

    fn apply(&self, slots: &mut [LightSlot], targets: &[LightTarget], now: Instant) {
        for target in targets {
            if let Some(slot) = slots.get_mut(target.index) {
                slot.dispatch(self.controller.as_ref(), target.color, target.brightness, now);
            }
        }
    }

    fn reset_lights(&self, slots: &mut [LightSlot]) {
        let now = Instant::now();
        for slot in slots.iter_mut().filter(|s| s.is_resolved()) {
            slot.force(self.controller.as_ref(), Rgb::WARM_WHITE, IDLE_BRIGHTNESS, now);
        }
    }
}

fn clamp_intensity(level: i64) -> u8 {
    level.clamp(MIN_INTENSITY as i64, MAX_INTENSITY as i64) as u8
}

fn clamp_latency(ms: i64) -> u64 {
    ms.clamp(0, MAX_LATENCY_MS as i64) as u64
}
