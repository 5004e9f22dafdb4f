//! In-memory transport for unit tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::transport::{InstrumentAddress, Session, Transport};

pub const RTB_IDN: &str = "Rohde&Schwarz,RTB2004,1333.1005k04/102345,02.300\r\n";

/// Everything that reached the fake wire.
#[derive(Debug, Default)]
pub struct Wire {
    pub opened: Vec<String>,
    pub writes: Vec<String>,
    pub queries: Vec<String>,
    pub timeout: Option<Duration>,
    pub closed: usize,
}

#[derive(Clone)]
pub struct MockTransport {
    pub resources: Option<Vec<String>>,
    pub idn: String,
    pub fail_open: bool,
    pub fail_idn: bool,
    pub fail_close: bool,
    /// Zero-based index of the write that should fail.
    pub fail_write_at: Option<usize>,
    pub wire: Arc<Mutex<Wire>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            resources: Some(Vec::new()),
            idn: RTB_IDN.to_string(),
            fail_open: false,
            fail_idn: false,
            fail_close: false,
            fail_write_at: None,
            wire: Arc::new(Mutex::new(Wire::default())),
        }
    }

    pub fn writes(&self) -> Vec<String> {
        self.wire.lock().unwrap().writes.clone()
    }

    pub fn with_wire<T>(&self, f: impl FnOnce(&Wire) -> T) -> T {
        f(&self.wire.lock().unwrap())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn list_resources(&self) -> Result<Vec<InstrumentAddress>> {
        match &self.resources {
            Some(list) => Ok(list.iter().map(|r| InstrumentAddress::new(r.as_str())).collect()),
            None => Err(anyhow!("resource manager unavailable")),
        }
    }

    async fn open_resource(&self, address: &InstrumentAddress) -> Result<Box<dyn Session>> {
        self.wire.lock().unwrap().opened.push(address.to_string());
        if self.fail_open {
            return Err(anyhow!("VI_ERROR_RSRC_NFOUND"));
        }
        Ok(Box::new(MockSession {
            transport: self.clone(),
            written: 0,
        }))
    }
}

struct MockSession {
    transport: MockTransport,
    written: usize,
}

#[async_trait]
impl Session for MockSession {
    async fn write(&mut self, command: &str) -> Result<()> {
        let index = self.written;
        self.written += 1;
        self.transport.wire.lock().unwrap().writes.push(command.to_string());
        if self.transport.fail_write_at == Some(index) {
            return Err(anyhow!("VI_ERROR_TMO"));
        }
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.transport.wire.lock().unwrap().queries.push(command.to_string());
        if self.transport.fail_idn {
            return Err(anyhow!("VI_ERROR_TMO"));
        }
        Ok(self.transport.idn.clone())
    }

    async fn close(&mut self) -> Result<()> {
        self.transport.wire.lock().unwrap().closed += 1;
        if self.transport.fail_close {
            return Err(anyhow!("VI_ERROR_CONN_LOST"));
        }
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.transport.wire.lock().unwrap().timeout = Some(timeout);
    }
}
