//! Persistent PCM source reader
//!
//! Runs on its own thread for the life of the process and keeps the source
//! drained whether or not a show or a speaker is attached, so the producer
//! never blocks on a full pipe. Every chunk goes to the broadcast buffer;
//! full frames are handed to the director at most `analysis_rate_hz` times
//! per second.

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::buffer::{AudioChunk, BroadcastBuffer};
use super::format::CHUNK_BYTES;
use super::source::PcmSource;
use crate::config::SourceConfig;
use crate::device::PlaybackSink;
use crate::show::director::Director;

/// Where and how to forward the broadcast stream to a speaker
#[derive(Clone)]
pub struct Forwarding {
    sink: Arc<dyn PlaybackSink>,
    runtime: tokio::runtime::Handle,
    stream_url: String,
}

impl Forwarding {
    /// Forward `stream_url` to `sink`, running sink calls on `runtime`
    pub fn new(
        sink: Arc<dyn PlaybackSink>,
        runtime: tokio::runtime::Handle,
        stream_url: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            runtime,
            stream_url: stream_url.into(),
        }
    }

    /// URL handed to the sink
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
}

enum SessionEnd {
    Eof,
    Shutdown,
}

/// Long-lived reader of the PCM source
pub struct SourceReader {
    source: Box<dyn PcmSource>,
    director: Arc<Director>,
    buffer: Option<Arc<BroadcastBuffer>>,
    forwarding: Option<Forwarding>,
    config: SourceConfig,
    shutdown: Receiver<()>,
    stopping: bool,

    session_chunks: usize,
    forwarding_started: bool,
    pending_stop: Option<tokio::task::JoinHandle<()>>,
    last_tick: Option<Instant>,
    /// Frames waiting out the latency they were queued under
    delayed: VecDeque<(Instant, AudioChunk)>,
    queued_latency: Duration,
    frames_analyzed: u64,
}

impl SourceReader {
    /// Reader feeding `director`; exits once `shutdown` yields or disconnects
    pub fn new(
        source: Box<dyn PcmSource>,
        director: Arc<Director>,
        config: SourceConfig,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            source,
            director,
            buffer: None,
            forwarding: None,
            config,
            shutdown,
            stopping: false,
            session_chunks: 0,
            forwarding_started: false,
            pending_stop: None,
            last_tick: None,
            delayed: VecDeque::new(),
            queued_latency: Duration::ZERO,
            frames_analyzed: 0,
        }
    }

    /// Broadcast every chunk into `buffer`
    pub fn with_buffer(mut self, buffer: Arc<BroadcastBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Start speaker forwarding once enough audio is buffered
    pub fn with_forwarding(mut self, forwarding: Forwarding) -> Self {
        self.forwarding = Some(forwarding);
        self
    }

    /// Run the reader on a dedicated thread
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("lumen-source-reader".to_string())
            .spawn(move || self.run())
    }

    /// Reader loop; returns only on shutdown
    pub fn run(mut self) {
        info!("Source reader: watching {}", self.source.describe());

        while !self.should_stop() {
            let exists = self.source.exists();
            self.director.set_source_state(exists, false);

            if !exists {
                if self.director.is_active() {
                    self.director.drive_idle(Instant::now(), wall_clock_secs());
                }
                if self.wait(self.config.idle_poll()) {
                    break;
                }
                continue;
            }

            // Named pipes block here until the producer opens its end
            match self.source.open() {
                Ok(reader) => {
                    self.on_connect();
                    let end = self.drain(reader);
                    let exists = self.source.exists();
                    self.director.set_source_state(exists, false);
                    match end {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Eof) => {
                            info!(
                                "Source reader: end of stream ({} frames analysed)",
                                self.frames_analyzed
                            );
                            self.schedule_stop();
                        }
                        Err(e) => {
                            debug!("Source reader: {}, retrying...", e);
                            self.schedule_stop();
                        }
                    }
                }
                Err(e) => debug!("Source reader: open failed: {}, retrying...", e),
            }

            if self.wait(self.config.reconnect_backoff()) {
                break;
            }
        }

        if let Some(pending) = self.pending_stop.take() {
            pending.abort();
        }
        self.director.set_source_state(self.source.exists(), false);
        info!("Source reader: stopped");
    }

    fn on_connect(&mut self) {
        let resumed = match self.pending_stop.take() {
            Some(pending) if !pending.is_finished() => {
                pending.abort();
                true
            }
            _ => false,
        };

        if resumed {
            info!("Source reader: reconnected within grace period, forwarding kept");
        } else {
            if let Some(buffer) = &self.buffer {
                buffer.clear();
            }
            self.forwarding_started = false;
            self.session_chunks = 0;
            info!("Source reader: connected to {}", self.source.describe());
        }

        self.director.set_source_state(true, true);
        self.director.reset_analysis();
        self.delayed.clear();
        self.last_tick = None;
        self.frames_analyzed = 0;
    }

    fn drain(&mut self, mut reader: Box<dyn Read + Send>) -> io::Result<SessionEnd> {
        let mut buf = vec![0u8; CHUNK_BYTES];
        loop {
            if self.should_stop() {
                return Ok(SessionEnd::Shutdown);
            }
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(SessionEnd::Eof),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.handle_chunk(Arc::from(&buf[..n]), Instant::now());
        }
    }

    fn handle_chunk(&mut self, chunk: AudioChunk, now: Instant) {
        if let Some(buffer) = &self.buffer {
            buffer.put(Arc::clone(&chunk));
            self.session_chunks += 1;
            let prebuffered = self.session_chunks >= self.config.prebuffer_chunks;
            if !self.forwarding_started && prebuffered {
                self.start_forwarding();
            }
        }

        if !self.director.is_active() {
            self.delayed.clear();
            return;
        }

        // Frames queued under another latency would land out of order
        let latency = self.director.latency();
        if latency != self.queued_latency {
            if !self.delayed.is_empty() {
                debug!(
                    "Source reader: latency now {:?}, dropping {} queued frames",
                    latency,
                    self.delayed.len()
                );
                self.delayed.clear();
            }
            self.queued_latency = latency;
        }
        self.flush_due(now);

        let period = self.config.analysis_period();
        let due = self
            .last_tick
            .map_or(true, |last| now.saturating_duration_since(last) >= period);
        if !due {
            return;
        }
        self.last_tick = Some(now);

        if chunk.len() == CHUNK_BYTES {
            if latency.is_zero() {
                self.analyze(&chunk, now);
            } else {
                self.delayed.push_back((now + latency, chunk));
                let limit = queue_limit(latency, period);
                while self.delayed.len() > limit {
                    self.delayed.pop_front();
                }
            }
        } else {
            self.director.drive_idle(now, wall_clock_secs());
        }
    }

    fn flush_due(&mut self, now: Instant) {
        while let Some((due, _)) = self.delayed.front() {
            if *due > now {
                break;
            }
            if let Some((_, chunk)) = self.delayed.pop_front() {
                self.analyze(&chunk, now);
            }
        }
    }

    fn analyze(&mut self, chunk: &[u8], now: Instant) {
        if self.director.process_frame(chunk, now) {
            self.frames_analyzed += 1;
        }
    }

    fn start_forwarding(&mut self) {
        self.forwarding_started = true;
        let Some(forwarding) = &self.forwarding else {
            return;
        };

        let sink = Arc::clone(&forwarding.sink);
        let url = forwarding.stream_url.clone();
        info!(
            "Source reader: {} chunks buffered, starting forwarding",
            self.session_chunks
        );
        forwarding.runtime.spawn(async move {
            if !sink.start_forwarding(&url).await {
                warn!("Playback sink rejected stream {}", url);
            }
        });
    }

    fn schedule_stop(&mut self) {
        if !self.forwarding_started {
            return;
        }
        let Some(forwarding) = &self.forwarding else {
            return;
        };

        let sink = Arc::clone(&forwarding.sink);
        let grace = self.config.eof_grace();
        debug!(
            "Source reader: stopping forwarding in {:?} unless the source returns",
            grace
        );
        self.pending_stop = Some(forwarding.runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            info!("Source reader: grace period over, stopping forwarding");
            sink.stop_forwarding().await;
        }));
    }

    fn should_stop(&mut self) -> bool {
        if !self.stopping {
            self.stopping = matches!(
                self.shutdown.try_recv(),
                Ok(()) | Err(TryRecvError::Disconnected)
            );
        }
        self.stopping
    }

    /// Sleep for `period` unless shutdown arrives first; true on shutdown
    fn wait(&mut self, period: Duration) -> bool {
        if self.stopping {
            return true;
        }
        self.stopping = match self.shutdown.recv_timeout(period) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        self.stopping
    }
}

/// Frames that fit in `latency` at one frame per `period`
fn queue_limit(latency: Duration, period: Duration) -> usize {
    (latency.as_nanos() / period.as_nanos().max(1)) as usize + 1
}

fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
