use lumen_core::{Director, LightController, Rgb, ShowError, ShowMode, MAX_LATENCY_MS};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    TurnOn,
    Color(Rgb),
    Brightness(u8),
}

/// Controller that resolves `lamp-N` to 10.0.0.N and records every
/// delivered command. Commands to `failing` error out unrecorded.
#[derive(Default)]
struct RecordingController {
    calls: Mutex<Vec<(IpAddr, Call)>>,
    failing: Option<IpAddr>,
}

impl RecordingController {
    fn take(&self) -> Vec<(IpAddr, Call)> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn record(&self, addr: IpAddr, call: Call) -> lumen_core::Result<()> {
        if self.failing == Some(addr) {
            return Err(ShowError::Device(format!("{} unreachable", addr)));
        }
        self.calls.lock().push((addr, call));
        Ok(())
    }

    fn calls_for(calls: &[(IpAddr, Call)], addr: IpAddr) -> Vec<Call> {
        calls
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl LightController for RecordingController {
    fn resolve_address(&self, light_id: &str) -> Option<IpAddr> {
        let n: u8 = light_id.strip_prefix("lamp-")?.parse().ok()?;
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)))
    }

    fn turn_on(&self, addr: IpAddr) -> lumen_core::Result<()> {
        self.record(addr, Call::TurnOn)
    }

    fn set_color(&self, addr: IpAddr, color: Rgb) -> lumen_core::Result<()> {
        self.record(addr, Call::Color(color))
    }

    fn set_brightness(&self, addr: IpAddr, percent: u8) -> lumen_core::Result<()> {
        self.record(addr, Call::Brightness(percent))
    }
}

fn lamp(n: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Deterministic white-noise stereo frame
fn noise_frame(seed: &mut u64, amplitude: f32) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(4096);
    for _ in 0..1024 {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let unit = ((*seed >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0;
        let s = (unit * amplitude * 32767.0) as i16;
        pcm.extend_from_slice(&s.to_le_bytes());
        pcm.extend_from_slice(&s.to_le_bytes());
    }
    pcm
}

fn sine_frame(bin: usize, amplitude: f32) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(4096);
    for n in 0..1024 {
        let phase = 2.0 * std::f32::consts::PI * bin as f32 * n as f32 / 1024.0;
        let s = (phase.sin() * amplitude * 32767.0) as i16;
        pcm.extend_from_slice(&s.to_le_bytes());
        pcm.extend_from_slice(&s.to_le_bytes());
    }
    pcm
}

#[test]
fn test_start_reports_active_mode() {
    let controller = Arc::new(RecordingController::default());
    let director = Director::new(controller.clone());

    for mode in ShowMode::PLAYABLE {
        director
            .start(mode, &ids(&["lamp-1", "lamp-2"]), 0, 7)
            .unwrap();
        let status = director.status();
        assert!(status.active);
        assert_eq!(status.mode, mode);
        assert_eq!(status.lights_connected, 2);
    }
}

#[test]
fn test_start_turns_on_resolved_lights_only() {
    let controller = Arc::new(RecordingController::default());
    let director = Director::new(controller.clone());

    director
        .start(ShowMode::Pulse, &ids(&["lamp-1", "unknown", "lamp-3"]), 0, 7)
        .unwrap();

    let calls = controller.take();
    assert_eq!(
        calls,
        vec![(lamp(1), Call::TurnOn), (lamp(3), Call::TurnOn)]
    );
    assert_eq!(director.status().lights_connected, 2);

    // Frames only reach resolved lights
    director.process_frame(&sine_frame(20, 0.4), Instant::now());
    let calls = controller.take();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|(a, _)| *a == lamp(1) || *a == lamp(3)));
}

#[test]
fn test_invalid_mode_is_rejected_without_side_effects() {
    let controller = Arc::new(RecordingController::default());
    let director = Director::new(controller.clone());
    director
        .start(ShowMode::Ambient, &ids(&["lamp-1"]), 120, 3)
        .unwrap();
    controller.take();
    let before = director.status();

    let err = director
        .start_named("rave", &ids(&["lamp-2"]), 0, 10)
        .unwrap_err();
    assert!(matches!(err, ShowError::InvalidMode(ref m) if m == "rave"));
    assert!(matches!(
        director.set_mode("off".parse().unwrap()),
        Err(ShowError::InvalidMode(_))
    ));

    assert_eq!(director.status(), before);
    assert!(controller.take().is_empty());
}

#[test]
fn test_stop_resets_each_light_exactly_once() {
    let controller = Arc::new(RecordingController::default());
    let director = Director::new(controller.clone());
    director
        .start(ShowMode::Party, &ids(&["lamp-1", "lamp-2", "ghost"]), 0, 8)
        .unwrap();

    let t0 = Instant::now();
    let mut seed = 7;
    for i in 0..5 {
        let frame = noise_frame(&mut seed, 0.3);
        director.process_frame(&frame, t0 + Duration::from_millis(100 * i));
    }
    controller.take();

    director.stop();
    let calls = controller.take();
    assert_eq!(calls.len(), 4);
    for addr in [lamp(1), lamp(2)] {
        assert_eq!(
            RecordingController::calls_for(&calls, addr),
            vec![Call::Color(Rgb::new(255, 180, 100)), Call::Brightness(50)]
        );
    }

    let status = director.status();
    assert!(!status.active);
    assert_eq!(status.mode, ShowMode::Off);
    assert_eq!(director.last_sent(0), Some((Some(Rgb::WARM_WHITE), Some(50))));
}

#[test]
fn test_party_spike_flashes_all_lights_white() {
    let controller = Arc::new(RecordingController::default());
    let director = Director::new(controller.clone());
    director
        .start(ShowMode::Party, &ids(&["lamp-1", "lamp-2"]), 0, 10)
        .unwrap();

    let t0 = Instant::now();
    let mut seed = 42;
    for i in 0..12 {
        let frame = noise_frame(&mut seed, 0.02);
        assert!(director.process_frame(&frame, t0 + Duration::from_millis(100 * i)));
    }
    controller.take();

    let loud = noise_frame(&mut seed, 0.9);
    assert!(director.process_frame(&loud, t0 + Duration::from_millis(1300)));

    let calls = controller.take();
    for addr in [lamp(1), lamp(2)] {
        let light_calls = RecordingController::calls_for(&calls, addr);
        assert_eq!(
            light_calls,
            vec![Call::Color(Rgb::WHITE), Call::Brightness(100)],
            "light {} did not strobe white",
            addr
        );
    }
    assert_eq!(director.last_sent(0), Some((Some(Rgb::WHITE), Some(100))));
    assert_eq!(director.last_sent(1), Some((Some(Rgb::WHITE), Some(100))));
}

#[test]
fn test_intensity_and_latency_clamp() {
    let director = Director::new(Arc::new(RecordingController::default()));

    director.set_intensity(1);
    assert_eq!(director.status().intensity, 1);
    director.set_intensity(15);
    assert_eq!(director.status().intensity, 10);

    director.set_latency(-5);
    assert_eq!(director.status().latency_ms, 0);
    director.set_latency(180);
    assert_eq!(director.status().latency_ms, 180);
    director.set_latency(3_600_000);
    assert_eq!(director.status().latency_ms, MAX_LATENCY_MS);
}

#[test]
fn test_failing_light_does_not_block_the_others() {
    let controller = Arc::new(RecordingController {
        failing: Some(lamp(1)),
        ..Default::default()
    });
    let director = Director::new(controller.clone());
    director
        .start(ShowMode::Party, &ids(&["lamp-1", "lamp-2"]), 0, 7)
        .unwrap();
    assert_eq!(controller.take(), vec![(lamp(2), Call::TurnOn)]);

    let mut seed = 3;
    assert!(director.process_frame(&noise_frame(&mut seed, 0.4), Instant::now()));
    let calls = controller.take();
    let delivered = RecordingController::calls_for(&calls, lamp(2));
    assert!(delivered.iter().any(|c| matches!(c, Call::Color(_))));
    assert!(delivered.iter().any(|c| matches!(c, Call::Brightness(_))));
    assert!(RecordingController::calls_for(&calls, lamp(1)).is_empty());
    assert_eq!(director.last_sent(0), Some((None, None)));

    director.stop();
    assert_eq!(
        controller.take(),
        vec![
            (lamp(2), Call::Color(Rgb::WARM_WHITE)),
            (lamp(2), Call::Brightness(50))
        ]
    );
    assert!(!director.status().active);
}

#[test]
fn test_idle_pattern_drives_lights() {
    let controller = Arc::new(RecordingController::default());
    let director = Director::new(controller.clone());
    director
        .start(ShowMode::Ambient, &ids(&["lamp-1", "lamp-2"]), 0, 7)
        .unwrap();
    controller.take();

    director.drive_idle(Instant::now(), 12.5);
    let calls = controller.take();
    assert_eq!(RecordingController::calls_for(&calls, lamp(1)).len(), 2);
    assert_eq!(RecordingController::calls_for(&calls, lamp(2)).len(), 2);

    // Nothing is driven once stopped
    director.stop();
    controller.take();
    director.drive_idle(Instant::now() + Duration::from_secs(1), 40.0);
    assert!(controller.take().is_empty());
}

#[test]
fn test_set_mode_keeps_lights() {
    let controller = Arc::new(RecordingController::default());
    let director = Director::new(controller.clone());
    director
        .start(ShowMode::Pulse, &ids(&["lamp-1"]), 0, 7)
        .unwrap();
    controller.take();

    director.set_mode(ShowMode::Party).unwrap();
    let status = director.status();
    assert_eq!(status.mode, ShowMode::Party);
    assert_eq!(status.lights_connected, 1);
    // No re-resolution and no power commands on a mode switch
    assert!(controller.take().is_empty());
}

#[test]
fn test_concurrent_mode_changes_and_frames() {
    let controller = Arc::new(RecordingController::default());
    let director = Arc::new(Director::new(controller));
    director
        .start(ShowMode::Pulse, &ids(&["lamp-1", "lamp-2"]), 0, 7)
        .unwrap();

    let frames = {
        let director = Arc::clone(&director);
        thread::spawn(move || {
            let mut seed = 1;
            let t0 = Instant::now();
            for i in 0..200 {
                let frame = noise_frame(&mut seed, 0.3);
                director.process_frame(&frame, t0 + Duration::from_millis(i * 40));
            }
        })
    };

    for i in 0..200 {
        let mode = ShowMode::PLAYABLE[i % 3];
        director.set_mode(mode).unwrap();
        let status = director.status();
        assert!(status.mode.is_playable());
    }
    frames.join().unwrap();

    director.set_mode(ShowMode::Ambient).unwrap();
    assert_eq!(director.status().mode, ShowMode::Ambient);
}
