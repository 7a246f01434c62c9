//! Endless WAV stream of the broadcast buffer
//!
//! Every GET gets its own buffer subscription, pumped by a blocking task into
//! the response body. The pump writes silence when no audio arrives so the
//! speaker's connection never starves, and it exits (releasing the
//! subscription) as soon as the client goes away.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName},
    response::IntoResponse,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;

use lumen_core::audio::format::{silence_chunk, wav_stream_header};
use lumen_core::Subscription;

use super::server::AppState;

/// How long the pump waits for audio before writing silence
pub const CHUNK_WAIT: Duration = Duration::from_secs(2);
/// Extra queued chunks folded into a single write
pub const MAX_COALESCED: usize = 10;

const PUMP_DEPTH: usize = 4;

fn stream_headers() -> [(HeaderName, &'static str); 4] {
    [
        (header::CONTENT_TYPE, "audio/x-wav"),
        (header::ACCEPT_RANGES, "none"),
        (header::CACHE_CONTROL, "no-cache, no-store"),
        (header::CONNECTION, "close"),
    ]
}

/// HEAD /stream.wav - existence probe, never subscribes
pub(super) async fn stream_probe() -> impl IntoResponse {
    tracing::info!("Stream: HEAD probe");
    stream_headers()
}

/// GET /stream.wav - WAV header followed by the live PCM stream
pub(super) async fn stream_audio(State(state): State<AppState>) -> impl IntoResponse {
    let subscription = state.buffer.subscription();
    let id = subscription.id();
    tracing::info!("Stream: listener {} connected", id);

    let (tx, rx) = mpsc::channel::<Bytes>(PUMP_DEPTH);
    tokio::task::spawn_blocking(move || {
        let stats = pump(&subscription, &tx);
        tracing::info!(
            "Stream: listener {} ended after {} bytes ({} silence, {} writes)",
            id,
            stats.bytes,
            stats.silence_bytes,
            stats.writes
        );
    });

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|bytes| (Ok::<_, Infallible>(bytes), rx))
    });
    (stream_headers(), Body::from_stream(body))
}

#[derive(Debug, Default)]
struct PumpStats {
    bytes: u64,
    silence_bytes: u64,
    writes: u64,
}

/// Feed `tx` until the receiving side is dropped
fn pump(subscription: &Subscription, tx: &mpsc::Sender<Bytes>) -> PumpStats {
    let mut stats = PumpStats::default();

    let header = Bytes::copy_from_slice(&wav_stream_header());
    stats.bytes += header.len() as u64;
    if tx.blocking_send(header).is_err() {
        return stats;
    }

    loop {
        let batch = next_batch(subscription, &mut stats);
        stats.bytes += batch.len() as u64;
        stats.writes += 1;
        if tx.blocking_send(batch).is_err() {
            return stats;
        }
    }
}

fn next_batch(subscription: &Subscription, stats: &mut PumpStats) -> Bytes {
    let Some(first) = subscription.recv(CHUNK_WAIT) else {
        let silence = silence_chunk();
        stats.silence_bytes += silence.len() as u64;
        return Bytes::from(silence);
    };

    let mut batch = Vec::with_capacity(first.len() * (MAX_COALESCED + 1));
    batch.extend_from_slice(&first);
    for _ in 0..MAX_COALESCED {
        match subscription.try_recv() {
            Some(chunk) => batch.extend_from_slice(&chunk),
            None => break,
        }
    }
    Bytes::from(batch)
}
