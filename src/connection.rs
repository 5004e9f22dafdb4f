//! Lifecycle of the single instrument session.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::discovery::NO_DEVICES_FOUND;
use crate::error::PanelError;
use crate::instrument::IDN_QUERY;
use crate::transport::{InstrumentAddress, Session, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The instrument's answer to `*IDN?`, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentIdentity(String);

impl InstrumentIdentity {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn field(&self, index: usize) -> Option<&str> {
        self.0.split(',').nth(index).map(str::trim)
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.field(0)
    }

    pub fn model(&self) -> Option<&str> {
        self.field(1)
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.field(2)
    }

    pub fn firmware(&self) -> Option<&str> {
        self.field(3)
    }
}

/// Shared handle to the open session, cloned into background tasks.
///
/// Each write holds the session lock, so two writes never interleave on the
/// wire. Nothing orders whole batches against each other.
#[derive(Clone)]
pub struct SessionHandle {
    address: InstrumentAddress,
    inner: Arc<Mutex<Box<dyn Session>>>,
}

impl SessionHandle {
    fn new(address: InstrumentAddress, session: Box<dyn Session>) -> Self {
        Self {
            address,
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn address(&self) -> &InstrumentAddress {
        &self.address
    }

    pub async fn write(&self, command: &str) -> Result<()> {
        self.inner.lock().await.write(command).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().await.close().await
    }
}

/// Work out which resource `connect` should open.
///
/// A non-empty IP wins over the selected directory entry. The directory
/// placeholder never counts as a selection.
pub fn resolve_target(ip: &str, selected: Option<&str>) -> Result<InstrumentAddress, PanelError> {
    let ip = ip.trim();
    if !ip.is_empty() {
        return Ok(InstrumentAddress::lan(ip));
    }
    match selected.map(str::trim) {
        Some(resource) if !resource.is_empty() && resource != NO_DEVICES_FOUND => {
            Ok(InstrumentAddress::new(resource))
        }
        _ => Err(PanelError::NoTargetSelected),
    }
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    io_timeout: Duration,
    state: ConnectionState,
    session: Option<SessionHandle>,
    identity: Option<InstrumentIdentity>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, io_timeout: Duration) -> Self {
        Self {
            transport,
            io_timeout,
            state: ConnectionState::Disconnected,
            session: None,
            identity: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_session(&self) -> Option<SessionHandle> {
        self.session.clone()
    }

    pub fn identity(&self) -> Option<&InstrumentIdentity> {
        self.identity.as_ref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Open a session to `ip` (if given) or the selected resource and identify it.
    ///
    /// Any previously open session is closed first.
    pub async fn connect(
        &mut self,
        ip: &str,
        selected: Option<&str>,
    ) -> Result<InstrumentIdentity, PanelError> {
        let address = resolve_target(ip, selected)?;
        if self.session.is_some() {
            self.disconnect().await;
        }

        self.state = ConnectionState::Connecting;
        info!("connecting to {address}");
        match self.open(&address).await {
            Ok((session, identity)) => {
                info!("connected to {address}: {}", identity.as_str());
                self.session = Some(SessionHandle::new(address, session));
                self.identity = Some(identity.clone());
                self.state = ConnectionState::Connected;
                Ok(identity)
            }
            Err(source) => {
                warn!("connection to {address} failed: {source:#}");
                self.state = ConnectionState::Disconnected;
                Err(PanelError::Connection {
                    address: address.to_string(),
                    source,
                })
            }
        }
    }

    async fn open(&self, address: &InstrumentAddress) -> Result<(Box<dyn Session>, InstrumentIdentity)> {
        let mut session = self.transport.open_resource(address).await?;
        session.set_timeout(self.io_timeout);
        match session.query(IDN_QUERY).await {
            Ok(idn) => Ok((session, InstrumentIdentity::new(&idn))),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!("closing half-open session to {address} failed: {close_err:#}");
                }
                Err(e).context("identification query failed")
            }
        }
    }

    /// Close the session if one is open. Always ends `Disconnected`.
    pub async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            info!("disconnecting from {}", session.address());
            if let Err(e) = session.close().await {
                warn!("error during disconnect: {e:#}");
            }
        }
        self.identity = None;
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TIMEOUT;
    use crate::testing::MockTransport;

    fn manager(transport: &MockTransport) -> ConnectionManager {
        ConnectionManager::new(Arc::new(transport.clone()), DEFAULT_TIMEOUT)
    }

    #[test]
    fn ip_takes_precedence_over_selection() {
        let addr = resolve_target(" 169.254.41.244 ", Some("TCPIP::10.0.0.2::INSTR")).unwrap();
        assert_eq!(addr.as_str(), "TCPIP::169.254.41.244::INSTR");

        let addr = resolve_target("", Some("TCPIP::10.0.0.2::INSTR")).unwrap();
        assert_eq!(addr.as_str(), "TCPIP::10.0.0.2::INSTR");

        assert!(matches!(resolve_target("  ", None), Err(PanelError::NoTargetSelected)));
        assert!(matches!(resolve_target("", Some("")), Err(PanelError::NoTargetSelected)));
    }

    #[tokio::test]
    async fn placeholder_selection_is_rejected_without_io() {
        let transport = MockTransport::new();
        let mut mgr = manager(&transport);

        let err = mgr.connect("", Some(NO_DEVICES_FOUND)).await.unwrap_err();
        assert!(matches!(err, PanelError::NoTargetSelected));
        assert!(mgr.current_session().is_none());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(transport.with_wire(|w| w.opened.is_empty()));
    }

    #[tokio::test]
    async fn connect_identifies_and_applies_timeout() {
        let transport = MockTransport::new();
        let mut mgr = manager(&transport);

        let identity = mgr.connect("169.254.41.244", None).await.unwrap();
        assert_eq!(identity.as_str(), "Rohde&Schwarz,RTB2004,1333.1005k04/102345,02.300");
        assert_eq!(identity.model(), Some("RTB2004"));
        assert_eq!(identity.firmware(), Some("02.300"));

        assert_eq!(mgr.state(), ConnectionState::Connected);
        let session = mgr.current_session().unwrap();
        assert_eq!(session.address().as_str(), "TCPIP::169.254.41.244::INSTR");
        assert_eq!(mgr.identity(), Some(&identity));

        transport.with_wire(|w| {
            assert_eq!(w.opened, vec!["TCPIP::169.254.41.244::INSTR"]);
            assert_eq!(w.queries, vec!["*IDN?"]);
            assert_eq!(w.timeout, Some(Duration::from_millis(5000)));
        });
    }

    #[tokio::test]
    async fn failed_open_reverts_to_disconnected() {
        let mut transport = MockTransport::new();
        transport.fail_open = true;
        let mut mgr = manager(&transport);

        let err = mgr.connect("10.1.1.1", None).await.unwrap_err();
        match err {
            PanelError::Connection { address, .. } => assert_eq!(address, "TCPIP::10.1.1.1::INSTR"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.current_session().is_none());
    }

    #[tokio::test]
    async fn failed_identification_closes_the_session() {
        let mut transport = MockTransport::new();
        transport.fail_idn = true;
        let mut mgr = manager(&transport);

        let err = mgr.connect("10.1.1.1", None).await.unwrap_err();
        assert!(err.to_string().contains("identification query failed"));
        assert!(mgr.current_session().is_none());
        assert!(mgr.identity().is_none());
        assert_eq!(transport.with_wire(|w| w.closed), 1);
    }

    #[tokio::test]
    async fn disconnect_succeeds_even_when_close_fails() {
        let mut transport = MockTransport::new();
        transport.fail_close = true;
        let mut mgr = manager(&transport);

        mgr.connect("10.1.1.1", None).await.unwrap();
        mgr.disconnect().await;
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(mgr.current_session().is_none());
        assert!(mgr.identity().is_none());

        // already disconnected: nothing to close
        mgr.disconnect().await;
        assert_eq!(transport.with_wire(|w| w.closed), 1);
    }

    #[tokio::test]
    async fn reconnect_closes_previous_session() {
        let transport = MockTransport::new();
        let mut mgr = manager(&transport);

        mgr.connect("10.1.1.1", None).await.unwrap();
        mgr.connect("10.1.1.2", None).await.unwrap();
        transport.with_wire(|w| {
            assert_eq!(w.closed, 1);
            assert_eq!(w.opened.len(), 2);
        });
        let session = mgr.current_session().unwrap();
        assert_eq!(session.address().as_str(), "TCPIP::10.1.1.2::INSTR");
    }
}
