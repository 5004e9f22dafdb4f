//! Command execution off the control loop.
//!
//! Every action runs on its own short-lived tokio task. A task never touches
//! the reporter; it posts exactly one [`Notification`] on the queue that the
//! control loop drains.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, SessionHandle};
use crate::error::PanelError;
use crate::instrument::CommandBatch;
use crate::status::Notification;

pub type NotificationQueue = mpsc::UnboundedReceiver<Notification>;

/// Write one command verbatim. Nothing is read back.
pub async fn execute(session: &SessionHandle, command: &str) -> Result<(), PanelError> {
    session
        .write(command)
        .await
        .map_err(|source| PanelError::Command {
            command: command.to_string(),
            source,
        })
}

/// Write each command in order; the first failure stops the batch.
///
/// Returns how many commands were sent.
pub async fn execute_batch(session: &SessionHandle, batch: &CommandBatch) -> Result<usize, PanelError> {
    let mut sent = 0;
    for command in batch.iter() {
        execute(session, command).await?;
        sent += 1;
    }
    Ok(sent)
}

pub struct Dispatcher {
    notify: mpsc::UnboundedSender<Notification>,
}

impl Dispatcher {
    /// The dispatcher and the single-consumer queue its tasks report into.
    pub fn new() -> (Self, NotificationQueue) {
        let (notify, queue) = mpsc::unbounded_channel();
        (Self { notify }, queue)
    }

    /// Send a single set-only command in the background.
    pub fn spawn_command(
        &self,
        manager: &ConnectionManager,
        command: impl Into<String>,
    ) -> Result<JoinHandle<()>, PanelError> {
        let session = manager.current_session().ok_or(PanelError::NotConnected)?;
        let command = command.into();
        let notify = self.notify.clone();

        Ok(tokio::spawn(async move {
            let outcome = match execute(&session, &command).await {
                Ok(()) => {
                    info!("sent command: {command}");
                    Notification::info("Command", format!("Sent command: {command}"))
                }
                Err(e) => {
                    warn!("{e}");
                    e.notification()
                }
            };
            post(&notify, outcome);
        }))
    }

    /// Send a batch in the background, reporting `success` when all of it went out.
    pub fn spawn_batch(
        &self,
        manager: &ConnectionManager,
        batch: CommandBatch,
        success: impl Into<String>,
    ) -> Result<JoinHandle<()>, PanelError> {
        let session = manager.current_session().ok_or(PanelError::NotConnected)?;
        let success = success.into();
        let notify = self.notify.clone();

        Ok(tokio::spawn(async move {
            let outcome = match execute_batch(&session, &batch).await {
                Ok(sent) => {
                    info!("applied {sent} command(s) to {}", session.address());
                    Notification::info("Success", success)
                }
                Err(e) => {
                    warn!("batch aborted: {e}");
                    Notification::error("Error", e.to_string())
                }
            };
            post(&notify, outcome);
        }))
    }
}

fn post(notify: &mpsc::UnboundedSender<Notification>, notification: Notification) {
    if notify.send(notification).is_err() {
        debug!("control loop gone; dropping notification");
    }
}
