pub mod config;
pub mod connection;
pub mod console;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod instrument;
pub mod lan;
pub mod status;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export the types a front end needs so it can depend on the crate
// without knowing the internal module layout.
pub use config::PanelConfig;
pub use connection::{ConnectionManager, ConnectionState, InstrumentIdentity, SessionHandle};
pub use console::Panel;
pub use discovery::{NO_DEVICES_FOUND, ResourceDirectory};
pub use dispatch::Dispatcher;
pub use error::PanelError;
pub use instrument::*;
pub use lan::LanTransport;
pub use status::{Notification, Severity, StatusReporter};
pub use transport::{InstrumentAddress, Session, Transport};
