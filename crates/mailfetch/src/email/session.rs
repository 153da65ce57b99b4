//! Lifecycle of the single mailbox connection owned by an engine.

use std::sync::Arc;

use log::{debug, info, warn};

use super::client::{MailConnection, MailConnector, ServerSettings};
use super::error::{EmailError, Result};

enum SessionState {
    /// Not connected yet.
    Idle,
    Open(Box<dyn MailConnection>),
    /// Shut down; never reopened.
    Closed,
}

/// A lazily opened, reused, explicitly closed mailbox connection.
///
/// Failed logins are returned to the caller and never retried here: servers
/// lock accounts after repeated failures.
pub struct MailSession {
    connector: Arc<dyn MailConnector>,
    settings: ServerSettings,
    state: SessionState,
}

impl MailSession {
    pub fn new(connector: Arc<dyn MailConnector>, settings: ServerSettings) -> Self {
        Self {
            connector,
            settings,
            state: SessionState::Idle,
        }
    }

    /// The open connection, connecting first if needed.
    pub async fn acquire(&mut self) -> Result<&mut dyn MailConnection> {
        match self.state {
            SessionState::Closed => return Err(EmailError::SessionClosed),
            SessionState::Idle => {
                let connection = self.connector.connect(&self.settings).await?;
                self.state = SessionState::Open(connection);
            }
            SessionState::Open(_) => debug!("Reusing open IMAP session"),
        }

        match &mut self.state {
            SessionState::Open(connection) => Ok(connection.as_mut()),
            _ => Err(EmailError::SessionClosed),
        }
    }

    /// Keeps the connection warm; nothing to do between calls.
    pub fn release(&mut self) {}

    /// Closes the mailbox, logs out and invalidates the session.
    ///
    /// A second call fails with [`EmailError::SessionClosed`].
    pub async fn shutdown(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Closed => Err(EmailError::SessionClosed),
            SessionState::Idle => {
                debug!("Session shut down before it was ever opened");
                Ok(())
            }
            SessionState::Open(mut connection) => {
                info!("Shutting down IMAP session for {}", self.settings.address);
                if let Err(e) = connection.close().await {
                    warn!("Failed to close mailbox before logout: {}", e);
                }
                connection.logout().await
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }
}

impl Drop for MailSession {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("MailSession dropped without explicit shutdown - connection will be closed");
        }
    }
}
