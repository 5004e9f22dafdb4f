//! LAN transport: VXI-11 through `tokio-vxi11`, or a raw SCPI socket.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_vxi11::DeviceClient;
use tracing::{debug, info, warn};

use crate::config::PanelConfig;
use crate::discovery;
use crate::transport::{InstrumentAddress, Resource, Session, Transport};

const MAX_READ: u32 = 4096;

pub struct LanTransport {
    connect_timeout: Duration,
    discovery_window: Duration,
    broadcast: SocketAddr,
    static_resources: Vec<InstrumentAddress>,
}

impl LanTransport {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            discovery_window: config.discovery_window,
            broadcast: config.broadcast,
            static_resources: config
                .static_resources
                .iter()
                .map(|r| InstrumentAddress::new(r.as_str()))
                .collect(),
        }
    }
}

#[async_trait]
impl Transport for LanTransport {
    async fn list_resources(&self) -> Result<Vec<InstrumentAddress>> {
        let mut resources = self.static_resources.clone();
        match discovery::broadcast_vxi11(self.broadcast, self.discovery_window).await {
            Ok(hosts) => {
                for host in hosts {
                    let address = InstrumentAddress::lan(&host.to_string());
                    if !resources.contains(&address) {
                        resources.push(address);
                    }
                }
            }
            Err(e) if !resources.is_empty() => {
                warn!("VXI-11 broadcast failed, listing configured resources only: {e:#}");
            }
            Err(e) => return Err(e),
        }
        Ok(resources)
    }

    async fn open_resource(&self, address: &InstrumentAddress) -> Result<Box<dyn Session>> {
        match address.parse()? {
            Resource::Vxi11 { host, device } => {
                info!("opening VXI-11 link to {host} ({device})");
                let client = DeviceClient::connect_with_timeout(host.as_str(), device.as_str(), self.connect_timeout)
                    .await
                    .with_context(|| format!("failed to open VXI-11 link to {host}"))?;
                Ok(Box::new(Vxi11Session {
                    inner: client,
                    timeout: self.connect_timeout,
                }))
            }
            Resource::Socket { host, port } => {
                info!("opening SCPI socket to {host}:{port}");
                let stream = timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port)))
                    .await
                    .with_context(|| format!("timed out connecting to {host}:{port}"))?
                    .with_context(|| format!("failed to connect to {host}:{port}"))?;
                Ok(Box::new(SocketSession {
                    stream: BufReader::new(stream),
                    timeout: self.connect_timeout,
                }))
            }
        }
    }
}

struct Vxi11Session {
    inner: DeviceClient,
    timeout: Duration,
}

#[async_trait]
impl Session for Vxi11Session {
    async fn write(&mut self, command: &str) -> Result<()> {
        debug!("SCPI write  -> {}", command);
        let line = format!("{command}\n");
        timeout(self.timeout, self.inner.write(line.as_bytes()))
            .await
            .with_context(|| format!("timed out sending {command:?}"))?
            .with_context(|| format!("failed to send {command:?}"))?;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        debug!("SCPI query  -> {}", command);
        self.write(command).await?;
        let resp = timeout(self.timeout, self.inner.read(MAX_READ))
            .await
            .with_context(|| format!("timed out waiting for reply to {command:?}"))??;
        let raw = String::from_utf8(resp)?;
        finish_response(command, &raw)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

struct SocketSession {
    stream: BufReader<TcpStream>,
    timeout: Duration,
}

#[async_trait]
impl Session for SocketSession {
    async fn write(&mut self, command: &str) -> Result<()> {
        debug!("SCPI write  -> {}", command);
        let line = format!("{command}\n");
        timeout(self.timeout, self.stream.get_mut().write_all(line.as_bytes()))
            .await
            .with_context(|| format!("timed out sending {command:?}"))?
            .with_context(|| format!("failed to send {command:?}"))?;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        debug!("SCPI query  -> {}", command);
        self.write(command).await?;
        let mut raw = String::new();
        let n = timeout(self.timeout, self.stream.read_line(&mut raw))
            .await
            .with_context(|| format!("timed out waiting for reply to {command:?}"))??;
        if n == 0 {
            return Err(anyhow!("connection closed by instrument"));
        }
        finish_response(command, &raw)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

fn finish_response(command: &str, raw: &str) -> Result<String> {
    let trimmed = raw.trim_matches(char::from(0)).trim().to_string();
    debug!("SCPI result <- {}", trimmed);
    if trimmed.is_empty() {
        return Err(anyhow!("empty response from device for command {command:?}"));
    }
    Ok(trimmed)
}
