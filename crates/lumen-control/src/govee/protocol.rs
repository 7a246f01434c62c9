//! Govee LAN message formats
//!
//! Every message is a JSON envelope `{"msg": {"cmd": ..., "data": {...}}}`.
//! Discovery goes out as multicast, control messages as unicast UDP.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};

use lumen_core::Rgb;

/// Multicast group the scan request is sent to
pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
/// Port devices listen on for scan requests
pub const SCAN_PORT: u16 = 4001;
/// Port scan responses are sent back to
pub const LISTEN_PORT: u16 = 4002;
/// Port devices accept control commands on
pub const CONTROL_PORT: u16 = 4003;

/// Brightness range accepted by the devices
pub const BRIGHTNESS_RANGE: (u8, u8) = (1, 100);
/// Color temperature range in Kelvin
pub const KELVIN_RANGE: (u32, u32) = (2000, 9000);

/// A device that answered a LAN scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub device_id: String,
    pub ip: IpAddr,
    pub sku: String,
}

fn envelope(cmd: &str, data: Value) -> Vec<u8> {
    json!({ "msg": { "cmd": cmd, "data": data } })
        .to_string()
        .into_bytes()
}

/// Multicast scan request
pub fn scan_request() -> Vec<u8> {
    envelope("scan", json!({ "account_topic": "reserve" }))
}

/// Power on/off
pub fn turn(on: bool) -> Vec<u8> {
    envelope("turn", json!({ "value": u8::from(on) }))
}

/// Brightness in percent, clamped to the device range
pub fn brightness(percent: u8) -> Vec<u8> {
    let value = percent.clamp(BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1);
    envelope("brightness", json!({ "value": value }))
}

/// RGB color; a zero color temperature selects RGB mode
pub fn color(color: Rgb) -> Vec<u8> {
    envelope(
        "colorwc",
        json!({
            "color": { "r": color.r, "g": color.g, "b": color.b },
            "colorTemInKelvin": 0,
        }),
    )
}

/// White at a color temperature, clamped to the device range
pub fn color_temperature(kelvin: u32) -> Vec<u8> {
    let kelvin = kelvin.clamp(KELVIN_RANGE.0, KELVIN_RANGE.1);
    envelope(
        "colorwc",
        json!({
            "color": { "r": 0, "g": 0, "b": 0 },
            "colorTemInKelvin": kelvin,
        }),
    )
}

/// Status query; the device answers on the sender's port
pub fn status_request() -> Vec<u8> {
    envelope("devStatus", json!({}))
}

#[derive(Deserialize)]
struct Envelope {
    msg: Message,
}

#[derive(Deserialize)]
struct Message {
    cmd: String,
    #[serde(default)]
    data: Value,
}

/// Parse a scan response.
///
/// Returns `None` for anything that is not a scan answer carrying both an IP
/// and a device id.
pub fn parse_scan_response(payload: &[u8]) -> Option<DiscoveredDevice> {
    let envelope: Envelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Govee: failed to parse scan response: {}", e);
            return None;
        }
    };
    if envelope.msg.cmd != "scan" {
        return None;
    }

    let data = &envelope.msg.data;
    let ip = data.get("ip")?.as_str()?.parse().ok()?;
    let device_id = data.get("device")?.as_str()?;
    if device_id.is_empty() {
        return None;
    }
    let sku = data.get("sku").and_then(Value::as_str).unwrap_or_default();

    Some(DiscoveredDevice {
        device_id: device_id.to_string(),
        ip,
        sku: sku.to_string(),
    })
}
