//! Govee lights over the LAN UDP protocol
//!
//! - Discovery: multicast to 239.255.255.250:4001, answers on 4002
//! - Control: unicast UDP to the device on port 4003

pub mod lan;
pub mod protocol;

pub use lan::{GoveeConfig, GoveeLan};
pub use protocol::DiscoveredDevice;
