//! IMAP transport.
//!
//! [`MailConnector`] and [`MailConnection`] are the seam between the session
//! logic and the wire protocol; [`ImapConnector`] is the TLS implementation.

use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use super::error::{EmailError, Result};

/// Type alias for the underlying async stream (using async-std compatible TcpStream).
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// Where and as whom to log in.
#[derive(Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub address: String,
    pub password: SecretString,
}

/// An authenticated mailbox connection. One command at a time.
#[async_trait]
pub trait MailConnection: Send {
    /// Makes `folder` the active mailbox.
    async fn select(&mut self, folder: &str) -> Result<()>;

    /// Runs a search in the active mailbox and returns message identifiers.
    async fn search(&mut self, criteria: &str) -> Result<Vec<String>>;

    /// Full raw message, or `None` when the identifier does not exist.
    async fn fetch(&mut self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Leaves the active mailbox.
    async fn close(&mut self) -> Result<()>;

    async fn logout(&mut self) -> Result<()>;
}

/// Opens authenticated connections.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self, settings: &ServerSettings) -> Result<Box<dyn MailConnection>>;
}

/// Connects over implicit TLS (IMAPS) and logs in with a password.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapConnector;

#[async_trait]
impl MailConnector for ImapConnector {
    async fn connect(&self, settings: &ServerSettings) -> Result<Box<dyn MailConnection>> {
        let addr = format!("{}:{}", settings.host, settings.port);
        info!("Connecting to IMAP server at {}", addr);

        // Establish TCP connection using std::net and wrap with async-io
        let std_stream = std::net::TcpStream::connect(&addr)
            .map_err(|e| EmailError::Connection(format!("{}: {}", addr, e)))?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| EmailError::Connection(e.to_string()))?;
        let tcp_stream =
            async_io::Async::new(std_stream).map_err(|e| EmailError::Connection(e.to_string()))?;

        let tls_stream = TlsConnector::new().connect(&settings.host, tcp_stream).await?;

        let client = async_imap::Client::new(tls_stream);
        let session = client
            .login(&settings.address, settings.password.expose_secret())
            .await
            .map_err(|(e, _)| EmailError::Authentication(e.to_string()))?;

        info!("Successfully authenticated to IMAP server as {}", settings.address);
        Ok(Box::new(ImapConnection {
            session,
            selected: false,
        }))
    }
}

struct ImapConnection {
    session: Session<TlsStream>,
    selected: bool,
}

#[async_trait]
impl MailConnection for ImapConnection {
    async fn select(&mut self, folder: &str) -> Result<()> {
        debug!("Selecting folder: {}", folder);

        self.session.select(folder).await.map_err(|e| match e {
            async_imap::error::Error::No(reason) | async_imap::error::Error::Bad(reason) => {
                EmailError::FolderNotFound {
                    folder: folder.to_string(),
                    reason,
                }
            }
            other => EmailError::Protocol(other.to_string()),
        })?;

        self.selected = true;
        Ok(())
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<String>> {
        debug!("Searching with query: {}", criteria);

        let uids = self
            .session
            .uid_search(criteria)
            .await
            .map_err(|e| EmailError::Search {
                query: criteria.to_string(),
                reason: e.to_string(),
            })?;

        // The reply is an unordered set; servers emit ascending UIDs, so restore that.
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();

        debug!("Found {} messages matching search", uids.len());
        Ok(uids.into_iter().map(|uid| uid.to_string()).collect())
    }

    async fn fetch(&mut self, id: &str) -> Result<Option<Vec<u8>>> {
        // Anything but a UID would be a protocol error rather than a miss.
        if id.parse::<u32>().is_err() {
            return Ok(None);
        }

        debug!("Fetching email with UID {}", id);

        // BODY.PEEK[] leaves the \Seen flag alone
        let mut messages = self
            .session
            .uid_fetch(id, "BODY.PEEK[]")
            .await
            .map_err(|e| EmailError::Fetch {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        let mut body = None;
        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| EmailError::Fetch {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
            if body.is_none() {
                body = message.body().map(|b| b.to_vec());
            }
        }

        Ok(body)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.selected {
            return Ok(());
        }
        self.session
            .close()
            .await
            .map_err(|e| EmailError::Protocol(e.to_string()))?;
        self.selected = false;
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        info!("Logging out from IMAP server");
        self.session
            .logout()
            .await
            .map_err(|e| EmailError::Protocol(e.to_string()))
    }
}

impl Drop for ImapConnection {
    fn drop(&mut self) {
        if self.selected {
            warn!("IMAP connection dropped with a mailbox still selected");
        }
    }
}
