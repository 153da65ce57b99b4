//! Mail retrieval error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to the mailbox or materializing attachments.
#[derive(Error, Debug)]
pub enum EmailError {
    /// Required settings are missing or invalid. Fatal at construction time.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Failed to open the TCP connection to the IMAP server.
    #[error("IMAP connection failed: {0}")]
    Connection(String),

    /// The server rejected the credentials or the TLS handshake failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The session was shut down and cannot be used again.
    #[error("Mail session has been shut down")]
    SessionClosed,

    /// The server rejected the folder name.
    #[error("IMAP folder '{folder}' not found: {reason}")]
    FolderNotFound { folder: String, reason: String },

    /// The server rejected the search criteria.
    #[error("Search '{query}' failed: {reason}")]
    Search { query: String, reason: String },

    /// No message with the identifier exists in the selected folder.
    #[error("Message '{id}' not found in folder '{folder}'")]
    MessageNotFound { id: String, folder: String },

    /// Fetching a message failed at the protocol level.
    #[error("Failed to fetch message '{id}': {reason}")]
    Fetch { id: String, reason: String },

    /// The raw message bytes could not be obtained or parsed at all.
    #[error("Failed to decode message '{id}': {reason}")]
    Decode { id: String, reason: String },

    /// Writing an attachment to disk failed.
    #[error("Failed to persist attachment to '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rendering a PDF attachment failed.
    #[error("Render error: {0}")]
    Render(#[from] crate::render::RenderError),

    /// Closing or logging out of the session failed.
    #[error("IMAP protocol error: {0}")]
    Protocol(String),
}

impl EmailError {
    /// Short text suitable for a chat reply. The full error chain belongs in logs.
    pub fn user_message(&self) -> String {
        match self {
            EmailError::Configuration(_) => {
                "Mail is not configured: set the mail address and password".to_string()
            }
            EmailError::Connection(_) | EmailError::Authentication(_) => {
                "Could not log in to the mail server".to_string()
            }
            EmailError::SessionClosed => "The mail session has already been closed".to_string(),
            EmailError::FolderNotFound { folder, .. } => format!("Folder '{}' does not exist", folder),
            EmailError::Search { .. } => "The mail server rejected the search".to_string(),
            EmailError::MessageNotFound { id, .. } => format!("No message with id {}", id),
            EmailError::Fetch { .. } | EmailError::Protocol(_) => {
                "Failed to read messages from the server".to_string()
            }
            EmailError::Decode { .. } => "A message could not be decoded".to_string(),
            EmailError::Persist { .. } => "Failed to save an attachment".to_string(),
            EmailError::Render(_) => "Failed to render a PDF attachment".to_string(),
        }
    }
}

impl From<crate::error::ConfigError> for EmailError {
    fn from(err: crate::error::ConfigError) -> Self {
        EmailError::Configuration(err.to_string())
    }
}

impl From<async_native_tls::Error> for EmailError {
    fn from(err: async_native_tls::Error) -> Self {
        EmailError::Authentication(format!("TLS handshake failed: {}", err))
    }
}

/// Result type for mail operations.
pub type Result<T> = std::result::Result<T, EmailError>;
