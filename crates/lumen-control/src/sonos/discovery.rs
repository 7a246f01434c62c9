//! Sonos speaker discovery via SSDP
//!
//! Sends an `M-SEARCH` for ZonePlayer devices and asks every responder for
//! its room name from the device description.

use reqwest::Client;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use super::soap::extract_tag;
use crate::Result;

/// SSDP multicast endpoint
pub const SSDP_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 1900);
/// Search target matching Sonos players
pub const ZONE_PLAYER_TARGET: &str = "urn:schemas-upnp-org:device:ZonePlayer:1";
/// Path of the device description document
pub const DESCRIPTION_PATH: &str = "/xml/device_description.xml";

/// A speaker found on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    pub ip: IpAddr,
    pub room_name: String,
}

/// The `M-SEARCH` request datagram
pub fn search_request() -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 1\r\n\
         ST: {}\r\n\r\n",
        SSDP_ADDR, ZONE_PLAYER_TARGET
    )
}

/// Whether an SSDP response advertises a ZonePlayer
pub fn is_zone_player_response(response: &str) -> bool {
    response.lines().any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("ST") && value.trim() == ZONE_PLAYER_TARGET
        })
    })
}

/// IPs of every ZonePlayer answering within `wait`
pub async fn search(wait: Duration) -> Result<Vec<IpAddr>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_multicast_ttl_v4(2)?;
    socket.send_to(search_request().as_bytes(), SSDP_ADDR).await?;

    let deadline = Instant::now() + wait;
    let mut found = BTreeSet::new();
    let mut buf = [0u8; 2048];
    while let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buf)).await {
        let (n, from) = received?;
        let response = String::from_utf8_lossy(&buf[..n]);
        if is_zone_player_response(&response) {
            found.insert(from.ip());
        }
    }

    tracing::debug!("Sonos: SSDP search found {} player(s)", found.len());
    Ok(found.into_iter().collect())
}

/// Room name reported by the speaker at `ip`
pub async fn room_name(client: &Client, ip: IpAddr, port: u16) -> Result<String> {
    let url = format!("http://{}{}", SocketAddr::new(ip, port), DESCRIPTION_PATH);
    let xml = client.get(&url).send().await?.error_for_status()?.text().await?;
    extract_tag(&xml, "roomName")
        .map(str::to_string)
        .ok_or_else(|| crate::ControlError::SonosError(format!("{} has no roomName", ip)))
}

/// Find the speaker whose room name matches `name` (case-insensitive)
pub async fn find_speaker(
    client: &Client,
    name: &str,
    port: u16,
    wait: Duration,
) -> Result<Option<Speaker>> {
    let mut available = Vec::new();
    for ip in search(wait).await? {
        match room_name(client, ip, port).await {
            Ok(room) if room.eq_ignore_ascii_case(name) => {
                tracing::info!("Sonos: found '{}' at {}", room, ip);
                return Ok(Some(Speaker {
                    ip,
                    room_name: room,
                }));
            }
            Ok(room) => available.push(room),
            Err(e) => tracing::debug!("Sonos: no description from {}: {}", ip, e),
        }
    }

    tracing::warn!("Sonos: '{}' not found. Available: {:?}", name, available);
    Ok(None)
}
