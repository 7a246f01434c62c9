//! Lumen - audio-reactive light shows
//!
//! Reads the raw PCM a Spotify Connect receiver writes into a named pipe,
//! re-serves it as an endless WAV stream for a Sonos speaker, and drives Govee
//! lights from a live spectral analysis of the same audio.

mod logging_setup;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use lumen_control::{AppState, GoveeLan, SonosForwarder, WebServer};
use lumen_core::{BroadcastBuffer, Director, FifoSource, Forwarding, SourceReader};

use crate::settings::AppConfig;

/// How long shutdown waits for the reader thread
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = AppConfig::from_env()?;
    logging_setup::init(&config.log)?;

    info!("Lumen {} starting", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let govee = Arc::new(
        GoveeLan::new(config.govee.clone()).context("Failed to open Govee control socket")?,
    );
    let director = Arc::new(Director::new(govee.clone()));
    let buffer = Arc::new(BroadcastBuffer::default());

    let sonos = if config.sonos.enabled {
        Some(Arc::new(
            SonosForwarder::new(config.sonos.clone()).context("Failed to create Sonos client")?,
        ))
    } else {
        info!("Sonos forwarding disabled");
        None
    };

    // Source reader
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    let mut reader = SourceReader::new(
        Box::new(FifoSource::new(&config.source.pipe_path)),
        Arc::clone(&director),
        config.source.clone(),
        shutdown_rx,
    )
    .with_buffer(Arc::clone(&buffer));
    if let Some(sonos) = &sonos {
        reader = reader.with_forwarding(Forwarding::new(
            sonos.clone(),
            tokio::runtime::Handle::current(),
            config.stream.stream_url(),
        ));
    }
    let reader = reader.spawn().context("Failed to spawn source reader")?;

    // HTTP surface
    let state = AppState {
        director: Arc::clone(&director),
        buffer,
        govee: Some(govee),
        defaults: config.show.clone(),
    };
    let mut server = WebServer::new(config.stream.clone(), state).spawn();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => warn!("Web server exited"),
                Ok(Err(e)) => error!("Web server failed: {}", e),
                Err(e) => error!("Web server task failed: {}", e),
            }
        }
    }

    // Shutdown: stop the reader, park the lights, silence the speaker
    server.abort();
    let _ = shutdown_tx.send(());
    let joined = tokio::time::timeout(
        READER_JOIN_TIMEOUT,
        tokio::task::spawn_blocking(move || reader.join()),
    )
    .await;
    match joined {
        Ok(Ok(Ok(()))) => {}
        Ok(_) => error!("Source reader panicked"),
        // A pipe open without a writer cannot be interrupted
        Err(_) => warn!("Source reader still blocked on the pipe, leaving it behind"),
    }

    let show = Arc::clone(&director);
    if let Err(e) = tokio::task::spawn_blocking(move || show.stop()).await {
        error!("Failed to stop the light show: {}", e);
    }

    if let Some(sonos) = &sonos {
        if sonos.is_forwarding() {
            sonos.stop().await;
        }
    }

    info!("Lumen stopped");
    Ok(())
}
