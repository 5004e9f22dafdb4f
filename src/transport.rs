//! The transport capability the panel depends on.
//!
//! Only five operations are used: enumerate resources, open a resource, and
//! write / query / close on an open session, plus setting its I/O timeout.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// VXI-11 device name used when the resource string does not name one.
pub const DEFAULT_DEVICE: &str = "inst0";

/// Opaque resource identifier, e.g. `TCPIP::169.254.41.244::INSTR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentAddress(String);

impl InstrumentAddress {
    pub fn new(resource: impl Into<String>) -> Self {
        Self(resource.into())
    }

    /// Network resource for an instrument reachable at `ip`.
    pub fn lan(ip: &str) -> Self {
        Self(format!("TCPIP::{ip}::INSTR"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the resource string into something a LAN transport can open.
    pub fn parse(&self) -> Result<Resource> {
        let parts: Vec<&str> = self.0.split("::").map(str::trim).collect();
        let interface = parts[0].to_ascii_uppercase();
        let board = interface.strip_prefix("TCPIP");
        if board.is_none_or(|b| !b.chars().all(|c| c.is_ascii_digit())) {
            bail!("unsupported resource {:?}: only TCPIP resources can be opened", self.0);
        }

        let class = parts.last().map(|p| p.to_ascii_uppercase()).unwrap_or_default();
        match (parts.as_slice(), class.as_str()) {
            ([_, host, _], "INSTR") if !host.is_empty() => Ok(Resource::Vxi11 {
                host: host.to_string(),
                device: DEFAULT_DEVICE.to_string(),
            }),
            ([_, host, device, _], "INSTR") if !host.is_empty() && !device.is_empty() => {
                Ok(Resource::Vxi11 {
                    host: host.to_string(),
                    device: device.to_string(),
                })
            }
            ([_, host, port, _], "SOCKET") if !host.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| anyhow!("invalid socket port {port:?} in {:?}: {e}", self.0))?;
                Ok(Resource::Socket {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Err(anyhow!("malformed resource string {:?}", self.0)),
        }
    }
}

impl fmt::Display for InstrumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentAddress {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A parsed LAN resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Vxi11 { host: String, device: String },
    Socket { host: String, port: u16 },
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Enumerate reachable resources. An empty list means "no devices".
    async fn list_resources(&self) -> Result<Vec<InstrumentAddress>>;

    async fn open_resource(&self, address: &InstrumentAddress) -> Result<Box<dyn Session>>;
}

/// An open channel to one instrument.
#[async_trait]
pub trait Session: Send {
    /// Send a command; a newline terminator is appended by the session.
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Send a command and return the trimmed response.
    async fn query(&mut self, command: &str) -> Result<String>;

    async fn close(&mut self) -> Result<()>;

    fn set_timeout(&mut self, timeout: Duration);
}
