//! Sonos playback forwarding
//!
//! Points one speaker at the engine's WAV stream and stops it again. The
//! speaker is located once and cached; a failed call drops the cache so the
//! next attempt rediscovers it.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use lumen_core::PlaybackSink;

use super::discovery::{self, Speaker};
use super::soap;
use crate::Result;

/// Sonos settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SonosConfig {
    /// Forward to a speaker at all
    pub enabled: bool,
    /// Room name of the target speaker
    pub speaker_name: String,
    /// Fixed speaker address, skips discovery
    pub speaker_ip: Option<IpAddr>,
    /// Port of the speaker's UPnP services
    pub port: u16,
    /// How long an SSDP search waits for answers
    pub discovery_timeout_ms: u64,
    /// Title shown on the speaker while forwarding
    pub stream_title: String,
}

impl Default for SonosConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speaker_name: "Living Room".to_string(),
            speaker_ip: None,
            port: 1400,
            discovery_timeout_ms: 5000,
            stream_title: "Lumen".to_string(),
        }
    }
}

/// Forwards the audio stream to a Sonos speaker
pub struct SonosForwarder {
    config: SonosConfig,
    client: Client,
    speaker: Mutex<Option<Speaker>>,
    forwarding: AtomicBool,
}

impl SonosForwarder {
    pub fn new(config: SonosConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            config,
            client,
            speaker: Mutex::new(None),
            forwarding: AtomicBool::new(false),
        })
    }

    /// Whether the speaker was last told to play
    pub fn is_forwarding(&self) -> bool {
        self.forwarding.load(Ordering::SeqCst)
    }

    async fn speaker(&self) -> Option<Speaker> {
        let mut cached = self.speaker.lock().await;
        if cached.is_none() {
            *cached = match self.config.speaker_ip {
                Some(ip) => Some(Speaker {
                    ip,
                    room_name: self.config.speaker_name.clone(),
                }),
                None => discovery::find_speaker(
                    &self.client,
                    &self.config.speaker_name,
                    self.config.port,
                    Duration::from_millis(self.config.discovery_timeout_ms),
                )
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("Sonos: discovery failed: {}", e);
                    None
                }),
            };
        }
        cached.clone()
    }

    async fn forget_speaker(&self) {
        if self.config.speaker_ip.is_none() {
            *self.speaker.lock().await = None;
        }
    }

    fn control_addr(&self, speaker: &Speaker) -> SocketAddr {
        SocketAddr::new(speaker.ip, self.config.port)
    }

    /// Tell the speaker to play `stream_url`
    pub async fn play(&self, stream_url: &str) -> bool {
        let Some(speaker) = self.speaker().await else {
            tracing::error!("Sonos: cannot forward, speaker not found");
            return false;
        };
        let addr = self.control_addr(&speaker);

        let body = soap::set_transport_uri_body(stream_url, &self.config.stream_title);
        let result = match soap::call(&self.client, addr, "SetAVTransportURI", body).await {
            Ok(()) => soap::call(&self.client, addr, "Play", soap::play_body()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.forwarding.store(true, Ordering::SeqCst);
                tracing::info!(
                    "Sonos: '{}' forwarding audio from {}",
                    speaker.room_name,
                    stream_url
                );
                true
            }
            Err(e) => {
                tracing::error!("Sonos: failed to start forwarding: {}", e);
                self.forget_speaker().await;
                false
            }
        }
    }

    /// Stop playback on the speaker
    pub async fn stop(&self) {
        let Some(speaker) = self.speaker().await else {
            return;
        };
        let addr = self.control_addr(&speaker);
        match soap::call(&self.client, addr, "Stop", soap::stop_body()).await {
            Ok(()) => tracing::info!("Sonos: stopped forwarding"),
            Err(e) => {
                tracing::error!("Sonos: failed to stop forwarding: {}", e);
                self.forget_speaker().await;
            }
        }
        self.forwarding.store(false, Ordering::SeqCst);
    }
}

impl PlaybackSink for SonosForwarder {
    fn start_forwarding<'a>(&'a self, stream_url: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(self.play(stream_url))
    }

    fn stop_forwarding(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.stop())
    }
}
