use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::discovery::PORTMAPPER_PORT;

/// Link-local address the RTB2004 picks when no DHCP server answers.
pub const DEFAULT_IP: &str = "169.254.41.244";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Initial content of the LAN IP field. Empty means "use the selected resource".
    pub ip: String,
    /// Read/write timeout applied to every open session.
    pub io_timeout: Duration,
    pub connect_timeout: Duration,
    pub discovery_window: Duration,
    pub broadcast: SocketAddr,
    /// Resources listed on every scan in addition to discovered ones.
    pub static_resources: Vec<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_string(),
            io_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_TIMEOUT,
            discovery_window: DEFAULT_DISCOVERY_WINDOW,
            broadcast: SocketAddr::from((Ipv4Addr::BROADCAST, PORTMAPPER_PORT)),
            static_resources: Vec::new(),
        }
    }
}
