//! Status projection for the operator.
//!
//! The reporter only renders what it is told: connection transitions, the
//! identity string and action outcomes. It lives on the control loop and is
//! never handed to background tasks; those post [`Notification`]s through the
//! dispatcher's queue instead.

use std::fmt;
use std::io::{self, Write};

use crate::connection::{ConnectionState, InstrumentIdentity};
use crate::error::PanelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, title, message)
    }

    fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity.as_str(), self.title, self.message)
    }
}

pub struct StatusReporter<W> {
    out: W,
    state: ConnectionState,
    identity: Option<String>,
}

impl<W: Write> StatusReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            state: ConnectionState::Disconnected,
            identity: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status_line(&self) -> &'static str {
        match self.state {
            ConnectionState::Disconnected => "Status: Disconnected",
            ConnectionState::Connecting => "Status: Connecting",
            ConnectionState::Connected => "Status: Connected",
        }
    }

    pub fn identity_line(&self) -> String {
        match &self.identity {
            Some(idn) => format!("ID: {idn}"),
            None => "Instrument ID: ---".to_string(),
        }
    }

    pub fn connected(&mut self, address: &str, identity: &InstrumentIdentity) -> io::Result<()> {
        self.state = ConnectionState::Connected;
        self.identity = Some(identity.as_str().to_string());
        self.render_status()?;
        self.notify(&Notification::info(
            "Connection",
            format!("Connected successfully: {address}"),
        ))
    }

    pub fn disconnected(&mut self) -> io::Result<()> {
        self.state = ConnectionState::Disconnected;
        self.identity = None;
        self.render_status()
    }

    pub fn notify(&mut self, notification: &Notification) -> io::Result<()> {
        writeln!(self.out, "{notification}")?;
        self.out.flush()
    }

    pub fn report(&mut self, err: &PanelError) -> io::Result<()> {
        self.notify(&err.notification())
    }

    /// Free-form output, e.g. the current settings or a resource listing.
    pub fn line(&mut self, text: impl fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    pub fn render_status(&mut self) -> io::Result<()> {
        let identity = self.identity_line();
        writeln!(self.out, "{} | {}", self.status_line(), identity)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
