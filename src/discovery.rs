//! Resource directory and VXI-11 broadcast discovery.

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

use crate::error::PanelError;
use crate::transport::{InstrumentAddress, Transport};

/// Placeholder shown while no resource is known.
pub const NO_DEVICES_FOUND: &str = "No Devices Found";

pub const PORTMAPPER_PORT: u16 = 111;

const PMAP_PROG: u32 = 100_000;
const PMAP_VERS: u32 = 2;
const PMAPPROC_GETPORT: u32 = 3;
const VXI11_CORE_PROG: u32 = 0x0006_07AF;
const VXI11_CORE_VERS: u32 = 1;
const IPPROTO_TCP: u32 = 6;
const RPC_CALL: u32 = 0;
const RPC_REPLY: u32 = 1;
const RPC_VERSION: u32 = 2;

static SCAN_COUNT: AtomicU32 = AtomicU32::new(0);

/// Discovered resources plus the current selection.
#[derive(Debug, Default)]
pub struct ResourceDirectory {
    resources: Vec<InstrumentAddress>,
    selected: usize,
}

impl ResourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerate through `transport`.
    ///
    /// Returns how many resources were found; zero is a valid outcome. On
    /// failure the directory falls back to the placeholder.
    pub async fn refresh(&mut self, transport: &dyn Transport) -> Result<usize, PanelError> {
        self.resources.clear();
        self.selected = 0;
        let found = transport.list_resources().await.map_err(PanelError::Discovery)?;
        info!("resource scan found {} device(s)", found.len());
        self.resources = found;
        Ok(self.resources.len())
    }

    pub fn resources(&self) -> &[InstrumentAddress] {
        &self.resources
    }

    /// The selected address, or [`NO_DEVICES_FOUND`] when the list is empty.
    pub fn selected(&self) -> &str {
        self.resources
            .get(self.selected)
            .map(InstrumentAddress::as_str)
            .unwrap_or(NO_DEVICES_FOUND)
    }

    pub fn select(&mut self, index: usize) -> bool {
        if index < self.resources.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    /// Put a manually entered resource at the top of the list and select it.
    pub fn insert(&mut self, address: InstrumentAddress) {
        self.resources.retain(|r| *r != address);
        self.resources.insert(0, address);
        self.selected = 0;
    }
}

/// Ask every portmapper on the segment where its VXI-11 core channel lives.
///
/// Hosts answering with a non-zero port within `window` are returned in the
/// order they replied.
pub async fn broadcast_vxi11(broadcast: SocketAddr, window: Duration) -> Result<Vec<IpAddr>> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))
        .await
        .context("failed to bind discovery socket")?;
    socket
        .set_broadcast(true)
        .context("failed to enable broadcast on discovery socket")?;

    let xid = next_xid();
    socket
        .send_to(&getport_request(xid), broadcast)
        .await
        .with_context(|| format!("failed to send discovery request to {broadcast}"))?;
    debug!("portmapper GETPORT broadcast to {broadcast} (xid {xid:#x})");

    let deadline = Instant::now() + window;
    let mut hosts = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let (n, peer) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(received) => received.context("discovery receive failed")?,
        };
        match parse_getport_reply(xid, &buf[..n]) {
            Some(port) => {
                debug!("VXI-11 core channel on {} port {}", peer.ip(), port);
                if !hosts.contains(&peer.ip()) {
                    hosts.push(peer.ip());
                }
            }
            None => debug!("ignoring {n}-byte datagram from {peer}"),
        }
    }
    Ok(hosts)
}

/// Transaction id for one scan, so late replies to an earlier scan are dropped.
fn next_xid() -> u32 {
    (std::process::id() << 16) ^ SCAN_COUNT.fetch_add(1, Ordering::Relaxed)
}

fn getport_request(xid: u32) -> Vec<u8> {
    let words = [
        xid,
        RPC_CALL,
        RPC_VERSION,
        PMAP_PROG,
        PMAP_VERS,
        PMAPPROC_GETPORT,
        0, // credential: AUTH_NONE
        0,
        0, // verifier: AUTH_NONE
        0,
        VXI11_CORE_PROG,
        VXI11_CORE_VERS,
        IPPROTO_TCP,
        0,
    ];
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn parse_getport_reply(xid: u32, datagram: &[u8]) -> Option<u16> {
    let word = |offset: usize| -> Option<u32> {
        let bytes = datagram.get(offset..offset + 4)?;
        Some(u32::from_be_bytes(bytes.try_into().ok()?))
    };

    if word(0)? != xid || word(4)? != RPC_REPLY || word(8)? != 0 {
        return None;
    }
    // verifier flavor at 12, opaque body length at 16, body padded to 4 bytes
    let verifier_len = usize::try_from(word(16)?).ok()?;
    let offset = 20 + verifier_len.div_ceil(4) * 4;
    if word(offset)? != 0 {
        return None;
    }
    let port = u16::try_from(word(offset + 4)?).ok()?;
    (port != 0).then_some(port)
}
