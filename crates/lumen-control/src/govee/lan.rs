//! Govee LAN controller
//!
//! Discovery is a blocking multicast scan; control commands are
//! fire-and-forget unicast datagrams. The device cache is shared between the
//! show engine (address resolution) and the HTTP device listing.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use lumen_core::{LightController, Rgb, ShowError};

use super::protocol::{self, DiscoveredDevice};
use crate::Result;

/// Govee LAN settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GoveeConfig {
    /// How long a scan collects responses
    pub discovery_timeout_ms: u64,
    /// How long scan results stay valid
    pub cache_ttl_secs: u64,
    /// How long a status query waits for the answer
    pub status_timeout_ms: u64,
    /// Port scan responses arrive on
    pub listen_port: u16,
    /// Port control commands are sent to
    pub control_port: u16,
}

impl Default for GoveeConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 3000,
            cache_ttl_secs: 300,
            status_timeout_ms: 1000,
            listen_port: protocol::LISTEN_PORT,
            control_port: protocol::CONTROL_PORT,
        }
    }
}

impl GoveeConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

#[derive(Default)]
struct DeviceCache {
    devices: HashMap<String, DiscoveredDevice>,
    scanned_at: Option<Instant>,
}

impl DeviceCache {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.scanned_at.is_some_and(|at| at.elapsed() < ttl)
    }

    fn list(&self) -> Vec<DiscoveredDevice> {
        let mut devices: Vec<_> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }
}

/// Controls Govee lights on the local network over UDP
pub struct GoveeLan {
    config: GoveeConfig,
    socket: UdpSocket,
    cache: Mutex<DeviceCache>,
    /// Held for the whole scan; the listen port admits one listener
    scan_lock: Mutex<()>,
}

impl GoveeLan {
    /// Create a controller with its own control socket
    pub fn new(config: GoveeConfig) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        tracing::info!(
            "Govee LAN controller ready (control port {}, cache TTL {}s)",
            config.control_port,
            config.cache_ttl_secs
        );
        Ok(Self {
            config,
            socket,
            cache: Mutex::new(DeviceCache::default()),
            scan_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &GoveeConfig {
        &self.config
    }

    /// Devices on the LAN, served from cache unless stale or `force` is set.
    ///
    /// A failed scan keeps the previous devices and their age.
    pub fn discover_devices(&self, force: bool) -> Vec<DiscoveredDevice> {
        {
            let cache = self.cache.lock();
            if !force && !cache.devices.is_empty() && cache.is_fresh(self.config.cache_ttl()) {
                return cache.list();
            }
        }

        // Scans take seconds; the cache stays readable meanwhile
        let _scan = self.scan_lock.lock();
        match self.scan() {
            Ok(found) => self.store(found),
            Err(e) => {
                tracing::error!("Govee: discovery failed: {}", e);
                self.cache.lock().list()
            }
        }
    }

    /// Address of `device_id`, rescanning once on a cache miss
    pub fn device_ip(&self, device_id: &str) -> Option<IpAddr> {
        {
            let cache = self.cache.lock();
            if cache.is_fresh(self.config.cache_ttl()) {
                if let Some(device) = cache.devices.get(device_id) {
                    return Some(device.ip);
                }
            }
        }

        self.discover_devices(true);
        self.cache.lock().devices.get(device_id).map(|d| d.ip)
    }

    /// Replace the cache with `devices`
    pub(crate) fn store(&self, devices: Vec<DiscoveredDevice>) -> Vec<DiscoveredDevice> {
        let mut cache = self.cache.lock();
        cache.devices = devices
            .into_iter()
            .map(|d| (d.device_id.clone(), d))
            .collect();
        cache.scanned_at = Some(Instant::now());
        cache.list()
    }

    fn scan(&self) -> io::Result<Vec<DiscoveredDevice>> {
        // Join the group before asking so no early answer is missed
        let listener = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.config.listen_port))?;
        listener.join_multicast_v4(&protocol::MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)?;

        let sender = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        sender.set_multicast_ttl_v4(1)?;
        sender.send_to(
            &protocol::scan_request(),
            (protocol::MULTICAST_ADDR, protocol::SCAN_PORT),
        )?;

        let deadline = Instant::now() + self.config.discovery_timeout();
        let mut devices = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            listener.set_read_timeout(Some(remaining))?;
            match listener.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if let Some(device) = protocol::parse_scan_response(&buf[..n]) {
                        tracing::debug!(
                            "Govee: discovered {} ({}) at {} via {}",
                            device.device_id,
                            device.sku,
                            device.ip,
                            from
                        );
                        devices.push(device);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    break
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Govee LAN scan complete: found {} device(s)", devices.len());
        Ok(devices)
    }

    fn send(&self, ip: IpAddr, payload: &[u8]) -> io::Result<()> {
        let target = SocketAddr::new(ip, self.config.control_port);
        self.socket.send_to(payload, target).map(|_| ())
    }

    /// Switch a light on or off
    pub fn turn(&self, ip: IpAddr, on: bool) -> io::Result<()> {
        self.send(ip, &protocol::turn(on))
    }

    /// Set white at a color temperature in Kelvin
    pub fn set_color_temperature(&self, ip: IpAddr, kelvin: u32) -> io::Result<()> {
        self.send(ip, &protocol::color_temperature(kelvin))
    }

    /// Query device status; `None` on timeout or an unreadable answer
    pub fn status(&self, ip: IpAddr) -> Option<Value> {
        let query = || -> io::Result<Vec<u8>> {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
            socket.set_read_timeout(Some(self.config.status_timeout()))?;
            socket.send_to(
                &protocol::status_request(),
                SocketAddr::new(ip, self.config.control_port),
            )?;
            let mut buf = [0u8; 4096];
            let (n, _) = socket.recv_from(&mut buf)?;
            Ok(buf[..n].to_vec())
        };

        match query() {
            Ok(payload) => match serde_json::from_slice(&payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Govee: status from {} unreadable: {}", ip, e);
                    None
                }
            },
            Err(e) => {
                tracing::debug!("Govee: status query to {} failed: {}", ip, e);
                None
            }
        }
    }
}

impl LightController for GoveeLan {
    fn resolve_address(&self, light_id: &str) -> Option<IpAddr> {
        let ip = self.device_ip(light_id);
        if ip.is_none() {
            tracing::warn!("Govee: device {} not found on the LAN", light_id);
        }
        ip
    }

    fn turn_on(&self, addr: IpAddr) -> lumen_core::Result<()> {
        self.turn(addr, true).map_err(|e| device_error(addr, "turn", e))
    }

    fn set_color(&self, addr: IpAddr, color: Rgb) -> lumen_core::Result<()> {
        self.send(addr, &protocol::color(color))
            .map_err(|e| device_error(addr, "colorwc", e))
    }

    fn set_brightness(&self, addr: IpAddr, percent: u8) -> lumen_core::Result<()> {
        self.send(addr, &protocol::brightness(percent))
            .map_err(|e| device_error(addr, "brightness", e))
    }
}

fn device_error(addr: IpAddr, cmd: &str, e: io::Error) -> ShowError {
    ShowError::Device(format!("{} to {} failed: {}", cmd, addr, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn device(id: &str, last_octet: u8) -> DiscoveredDevice {
        DiscoveredDevice {
            device_id: id.to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, last_octet)),
            sku: "H6076".to_string(),
        }
    }

    /// Controller aimed at a local socket standing in for a device
    fn local_pair() -> (GoveeLan, UdpSocket) {
        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        device
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let config = GoveeConfig {
            control_port: device.local_addr().unwrap().port(),
            status_timeout_ms: 500,
            ..Default::default()
        };
        (GoveeLan::new(config).unwrap(), device)
    }

    fn recv_json(socket: &UdpSocket) -> Value {
        let mut buf = [0u8; 1024];
        let (n, _) = socket.recv_from(&mut buf).unwrap();
        serde_json::from_slice(&buf[..n]).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = GoveeConfig::default();
        assert_eq!(config.discovery_timeout(), Duration::from_secs(3));
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.control_port, 4003);
        assert_eq!(config.listen_port, 4002);
    }

    #[test]
    fn test_fresh_cache_serves_lookups() {
        let lan = GoveeLan::new(GoveeConfig::default()).unwrap();
        lan.store(vec![device("b", 2), device("a", 1)]);

        assert_eq!(
            lan.device_ip("a"),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)))
        );
        let listed = lan.discover_devices(false);
        assert_eq!(
            listed.iter().map(|d| d.device_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    /// Config whose listen port is already taken by `holder`
    fn busy_listen_port(holder: &UdpSocket) -> GoveeConfig {
        GoveeConfig {
            listen_port: holder.local_addr().unwrap().port(),
            discovery_timeout_ms: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_scan_keeps_known_devices() {
        let holder = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let lan = GoveeLan::new(busy_listen_port(&holder)).unwrap();
        lan.store(vec![device("known", 9)]);

        let listed = lan.discover_devices(true);
        assert_eq!(listed, vec![device("known", 9)]);
        assert_eq!(
            lan.device_ip("known"),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9)))
        );
    }

    #[test]
    fn test_failed_scan_does_not_refresh_cache_age() {
        let holder = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let lan = GoveeLan::new(busy_listen_port(&holder)).unwrap();
        assert!(lan.discover_devices(true).is_empty());

        let cache = lan.cache.lock();
        assert!(cache.scanned_at.is_none());
    }

    #[test]
    fn test_device_error_names_command() {
        let err = device_error(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
            "brightness",
            io::Error::new(io::ErrorKind::Other, "unreachable"),
        );
        assert!(matches!(err, ShowError::Device(ref m) if m.contains("brightness to 10.0.0.3")));
    }

    #[test]
    fn test_commands_reach_device() {
        let (lan, device) = local_pair();
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        lan.turn_on(ip).unwrap();
        let msg = recv_json(&device);
        assert_eq!(msg["msg"]["cmd"], "turn");
        assert_eq!(msg["msg"]["data"]["value"], 1);

        lan.set_color(ip, Rgb::new(1, 2, 3)).unwrap();
        let msg = recv_json(&device);
        assert_eq!(msg["msg"]["cmd"], "colorwc");
        assert_eq!(msg["msg"]["data"]["color"]["b"], 3);

        lan.set_brightness(ip, 0).unwrap();
        let msg = recv_json(&device);
        assert_eq!(msg["msg"]["cmd"], "brightness");
        assert_eq!(msg["msg"]["data"]["value"], 1);

        lan.set_color_temperature(ip, 4000).unwrap();
        let msg = recv_json(&device);
        assert_eq!(msg["msg"]["data"]["colorTemInKelvin"], 4000);
    }

    #[test]
    fn test_status_round_trip() {
        let (lan, device) = local_pair();
        let responder = thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (n, from) = device.recv_from(&mut buf).unwrap();
            let query: Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(query["msg"]["cmd"], "devStatus");
            let answer = br#"{"msg":{"cmd":"devStatus","data":{"onOff":1,"brightness":42}}}"#;
            device.send_to(answer, from).unwrap();
        });

        let status = lan.status(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert_eq!(status["msg"]["data"]["brightness"], 42);
        responder.join().unwrap();
    }

    #[test]
    fn test_status_times_out() {
        let (lan, _device) = local_pair();
        assert!(lan.status(IpAddr::V4(Ipv4Addr::LOCALHOST)).is_none());
    }
}
