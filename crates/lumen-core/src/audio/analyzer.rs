//! Spectral analyzer - per-frame FFT features and beat/spike detection
//!
//! Each call consumes one fixed-size frame (1024 mono samples at 44.1 kHz),
//! so there is no overlap or ring buffering: one frame in, one
//! [`SpectralFeatures`] out.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, trace};

use super::format::{downmix_to_mono, FRAME_SAMPLES, SAMPLE_RATE};

/// Bass band bins (~43-260 Hz at 1024 points / 44.1 kHz)
pub const BASS_BINS: RangeInclusive<usize> = 1..=6;
/// Mid band bins (~260-4000 Hz)
pub const MID_BINS: RangeInclusive<usize> = 6..=93;
/// Treble band bins (~4000-16000 Hz)
pub const TREBLE_BINS: RangeInclusive<usize> = 93..=372;

/// Flux must exceed this multiple of the rolling average to count as a beat
pub const DEFAULT_BEAT_THRESHOLD: f32 = 1.5;
/// Flux must exceed this multiple of the rolling average to count as a spike
pub const DEFAULT_SPIKE_THRESHOLD: f32 = 3.0;
/// Frames that must pass after a beat before the next one can fire
pub const DEFAULT_COOLDOWN_FRAMES: u32 = 4;
/// Rolling flux window (~1.3 s at 30 Hz)
pub const DEFAULT_FLUX_HISTORY: usize = 40;
/// Rolling RMS window for the energy trend (~4 s at 30 Hz)
pub const DEFAULT_TREND_HISTORY: usize = 120;

/// Tuning for [`SpectralAnalyzer`] and [`BeatDetector`]
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerConfig {
    /// Beat threshold relative to rolling flux average
    pub beat_threshold: f32,
    /// Spike threshold relative to rolling flux average
    pub spike_threshold: f32,
    /// Minimum frames between two beats
    pub cooldown_frames: u32,
    /// Length of the rolling flux window
    pub flux_history: usize,
    /// Minimum flux history before detection is armed
    pub min_history: usize,
    /// Length of the rolling RMS window
    pub trend_history: usize,
    /// EMA factor for bass and RMS
    pub fast_smoothing: f32,
    /// EMA factor for mid, treble and centroid
    pub medium_smoothing: f32,
    /// EMA factor for secondary stages (smoothed flux)
    pub slow_smoothing: f32,
    /// Lower edge of the centroid window in Hz
    pub centroid_low_hz: f32,
    /// Upper edge of the centroid window in Hz
    pub centroid_high_hz: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            beat_threshold: DEFAULT_BEAT_THRESHOLD,
            spike_threshold: DEFAULT_SPIKE_THRESHOLD,
            cooldown_frames: DEFAULT_COOLDOWN_FRAMES,
            flux_history: DEFAULT_FLUX_HISTORY,
            min_history: 4,
            trend_history: DEFAULT_TREND_HISTORY,
            fast_smoothing: 0.35,
            medium_smoothing: 0.2,
            slow_smoothing: 0.08,
            centroid_low_hz: 100.0,
            centroid_high_hz: 8000.0,
        }
    }
}

/// Features of one analysis frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectralFeatures {
    /// Mean bass magnitude
    pub bass: f32,
    /// Mean mid magnitude
    pub mid: f32,
    /// Mean treble magnitude
    pub treble: f32,
    /// RMS loudness of the mono frame
    pub rms: f32,
    /// Smoothed bass
    pub bass_smooth: f32,
    /// Smoothed mid
    pub mid_smooth: f32,
    /// Smoothed treble
    pub treble_smooth: f32,
    /// Smoothed RMS
    pub rms_smooth: f32,
    /// Spectral flux (sum of positive magnitude deltas)
    pub flux: f32,
    /// Slowly smoothed flux
    pub flux_smooth: f32,
    /// Spectral centroid normalized to the centroid window (0-1)
    pub centroid: f32,
    /// Smoothed centroid
    pub centroid_smooth: f32,
    /// Mean RMS of the newer half of the trend window minus the older half
    pub energy_trend: f32,
    /// Beat detected this frame
    pub is_beat: bool,
    /// Spike detected this frame
    pub is_spike: bool,
}

/// Outcome of one [`BeatDetector::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeatEvent {
    /// Flux crossed the beat threshold outside the cooldown
    pub is_beat: bool,
    /// Flux crossed the spike threshold
    pub is_spike: bool,
}

/// Flux-based beat and spike detector with a frame cooldown
#[derive(Debug, Clone)]
pub struct BeatDetector {
    history: VecDeque<f32>,
    window: usize,
    min_history: usize,
    beat_threshold: f32,
    spike_threshold: f32,
    cooldown_frames: u32,
    frames_since_beat: u32,
    beat_count: u64,
}

impl BeatDetector {
    /// Create a detector from the analyzer tuning
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.flux_history.max(1)),
            window: config.flux_history.max(1),
            min_history: config.min_history,
            beat_threshold: config.beat_threshold,
            spike_threshold: config.spike_threshold,
            cooldown_frames: config.cooldown_frames,
            frames_since_beat: config.cooldown_frames,
            beat_count: 0,
        }
    }

    /// Feed one flux value.
    ///
    /// The rolling average is taken over previous frames only, so a frame
    /// never dampens its own detection.
    pub fn update(&mut self, flux: f32) -> BeatEvent {
        self.frames_since_beat = self.frames_since_beat.saturating_add(1);

        let mut event = BeatEvent::default();
        if self.history.len() >= self.min_history {
            let avg = self.history.iter().sum::<f32>() / self.history.len() as f32;
            if avg > f32::EPSILON {
                event.is_spike = flux > avg * self.spike_threshold;
                event.is_beat = flux > avg * self.beat_threshold
                    && self.frames_since_beat >= self.cooldown_frames;
            }
        }

        if event.is_beat {
            self.frames_since_beat = 0;
            self.beat_count += 1;
        }

        self.history.push_back(flux);
        while self.history.len() > self.window {
            self.history.pop_front();
        }

        event
    }

    /// Total beats since construction or the last reset
    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.history.clear();
        self.frames_since_beat = self.cooldown_frames;
        self.beat_count = 0;
    }
}

/// Per-frame spectral analyzer with smoothing and trend state
pub struct SpectralAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    fft_buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    mono: Vec<f32>,
    magnitudes: Vec<f32>,
    prev_magnitudes: Option<Vec<f32>>,
    centroid_bins: RangeInclusive<usize>,
    smoothed: SpectralFeatures,
    rms_history: VecDeque<f32>,
    beats: BeatDetector,
    frame_count: u64,
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl SpectralAnalyzer {
    /// Create an analyzer with the given tuning
    pub fn new(config: AnalyzerConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FRAME_SAMPLES);
        let scratch_len = fft.get_inplace_scratch_len();

        let half = FRAME_SAMPLES / 2;
        let bin_hz = SAMPLE_RATE as f32 / FRAME_SAMPLES as f32;
        let lo = (config.centroid_low_hz / bin_hz).ceil().max(1.0) as usize;
        let hi = ((config.centroid_high_hz / bin_hz).floor() as usize).min(half);

        debug!(
            "SpectralAnalyzer created: fft_size={}, centroid bins {}..={}",
            FRAME_SAMPLES, lo, hi
        );

        Self {
            beats: BeatDetector::new(&config),
            rms_history: VecDeque::with_capacity(config.trend_history.max(1)),
            config,
            fft,
            fft_buffer: vec![Complex::new(0.0, 0.0); FRAME_SAMPLES],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            mono: Vec::with_capacity(FRAME_SAMPLES),
            magnitudes: vec![0.0; half + 1],
            prev_magnitudes: None,
            centroid_bins: lo..=hi,
            smoothed: SpectralFeatures::default(),
            frame_count: 0,
        }
    }

    /// Tuning in use
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one interleaved 16-bit stereo frame
    pub fn analyze(&mut self, pcm: &[u8]) -> SpectralFeatures {
        let mut mono = std::mem::take(&mut self.mono);
        downmix_to_mono(pcm, &mut mono);
        let features = self.analyze_mono(&mono);
        self.mono = mono;
        features
    }

    /// Analyze one frame of mono samples in [-1, 1].
    ///
    /// Short frames are zero-padded; extra samples are ignored.
    pub fn analyze_mono(&mut self, samples: &[f32]) -> SpectralFeatures {
        self.frame_count += 1;

        let frame = &samples[..samples.len().min(FRAME_SAMPLES)];
        let rms = calculate_rms(frame);

        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            let s = frame.get(i).copied().filter(|s| s.is_finite()).unwrap_or(0.0);
            *slot = Complex::new(s, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch);

        let norm = 2.0 / FRAME_SAMPLES as f32;
        for (mag, bin) in self.magnitudes.iter_mut().zip(self.fft_buffer.iter()) {
            *mag = bin.norm() * norm;
        }

        let bass = band_mean(&self.magnitudes, BASS_BINS);
        let mid = band_mean(&self.magnitudes, MID_BINS);
        let treble = band_mean(&self.magnitudes, TREBLE_BINS);

        let flux = match &self.prev_magnitudes {
            Some(prev) => self
                .magnitudes
                .iter()
                .zip(prev.iter())
                .map(|(cur, old)| (cur - old).max(0.0))
                .sum(),
            None => 0.0,
        };
        match &mut self.prev_magnitudes {
            Some(prev) => prev.copy_from_slice(&self.magnitudes),
            None => self.prev_magnitudes = Some(self.magnitudes.clone()),
        }

        let centroid = self.centroid();

        self.rms_history.push_back(rms);
        while self.rms_history.len() > self.config.trend_history.max(1) {
            self.rms_history.pop_front();
        }
        let energy_trend = energy_trend(&self.rms_history);

        let fast = self.config.fast_smoothing;
        let medium = self.config.medium_smoothing;
        let slow = self.config.slow_smoothing;
        let s = &mut self.smoothed;
        s.bass_smooth = ema(s.bass_smooth, bass, fast);
        s.rms_smooth = ema(s.rms_smooth, rms, fast);
        s.mid_smooth = ema(s.mid_smooth, mid, medium);
        s.treble_smooth = ema(s.treble_smooth, treble, medium);
        s.centroid_smooth = ema(s.centroid_smooth, centroid, medium);
        s.flux_smooth = ema(s.flux_smooth, flux, slow);

        let beat = self.beats.update(flux);

        let features = SpectralFeatures {
            bass,
            mid,
            treble,
            rms,
            flux,
            centroid,
            energy_trend,
            is_beat: beat.is_beat,
            is_spike: beat.is_spike,
            ..self.smoothed
        };

        trace!(
            "frame #{}: rms={:.4} flux={:.4} centroid={:.3} beat={} spike={}",
            self.frame_count,
            rms,
            flux,
            centroid,
            beat.is_beat,
            beat.is_spike
        );

        features
    }

    /// Beats detected since the last reset
    pub fn beat_count(&self) -> u64 {
        self.beats.beat_count()
    }

    /// Frames analysed since construction
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Drop all inter-frame state; the next frame is treated as the first
    pub fn reset(&mut self) {
        self.prev_magnitudes = None;
        self.smoothed = SpectralFeatures::default();
        self.rms_history.clear();
        self.beats.reset();
    }

    fn centroid(&self) -> f32 {
        let bin_hz = SAMPLE_RATE as f32 / FRAME_SAMPLES as f32;
        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        for k in self.centroid_bins.clone() {
            let mag = self.magnitudes[k];
            weighted += k as f32 * bin_hz * mag;
            total += mag;
        }

        if total <= f32::EPSILON {
            return 0.5;
        }

        let lo = self.config.centroid_low_hz;
        let span = (self.config.centroid_high_hz - lo).max(1.0);
        ((weighted / total - lo) / span).clamp(0.0, 1.0)
    }
}

fn ema(prev: f32, value: f32, alpha: f32) -> f32 {
    prev + alpha * (value - prev)
}

fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| s * s)
        .sum();
    (sum / samples.len() as f32).sqrt()
}

fn band_mean(magnitudes: &[f32], bins: RangeInclusive<usize>) -> f32 {
    let end = (*bins.end()).min(magnitudes.len().saturating_sub(1));
    let start = *bins.start();
    if start > end {
        return 0.0;
    }
    let slice = &magnitudes[start..=end];
    slice.iter().sum::<f32>() / slice.len() as f32
}

fn energy_trend(history: &VecDeque<f32>) -> f32 {
    if history.len() < 2 {
        return 0.0;
    }
    let half = history.len() / 2;
    let older = history.iter().take(half).sum::<f32>() / half as f32;
    let newer_len = history.len() - half;
    let newer = history.iter().skip(half).sum::<f32>() / newer_len as f32;
    newer - older
}
