//! Mail retrieval over IMAP.
//!
//! This module searches a mailbox folder for messages matching keywords and
//! saves the attachments of individual messages.

pub mod client;
pub mod error;
pub mod mime;
pub mod query;
pub mod retrieval;
pub mod session;

pub use client::{ImapConnector, MailConnection, MailConnector, ServerSettings};
pub use error::{EmailError, Result};
pub use mime::{AttachmentRecord, DecodeWarning, DecodedMessage, MimePart};
pub use query::{KeywordFilter, MessageSummary, SearchRequest};
pub use retrieval::{AttachmentReport, FailedAttachment};
pub use session::MailSession;
