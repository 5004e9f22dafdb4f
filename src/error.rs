//! Failures surfaced by the control layer.

use thiserror::Error;

use crate::status::Notification;

/// Every way a panel action can fail.
///
/// Transport causes are kept as [`anyhow::Error`] so the full context chain
/// reaches the operator.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("VISA scan failed: {0:#}")]
    Discovery(#[source] anyhow::Error),

    #[error("No device selected or found.")]
    NoTargetSelected,

    #[error("Could not connect to {address}: {source:#}")]
    Connection {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to send {command:?}: {source:#}")]
    Command {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Connect to scope first.")]
    NotConnected,
}

impl PanelError {
    /// The single notification shown for this failure.
    pub fn notification(&self) -> Notification {
        match self {
            PanelError::Discovery(_) => Notification::error("Error", self.to_string()),
            PanelError::NoTargetSelected | PanelError::Connection { .. } => {
                Notification::error("Connection Error", self.to_string())
            }
            PanelError::Command { .. } => Notification::error("Command Error", self.to_string()),
            PanelError::NotConnected => Notification::warning("Warning", self.to_string()),
        }
    }
}
