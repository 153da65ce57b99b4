//! Fetching one message and saving its attachments.

use log::{debug, error};

use super::client::MailConnection;
use super::error::{EmailError, Result};
use super::mime::decode_message;
use crate::storage::{AttachmentStore, SavedAttachment};

/// An attachment that could not be saved.
#[derive(Debug)]
pub struct FailedAttachment {
    pub filename: String,
    pub error: EmailError,
}

/// Outcome of saving every attachment of a message, in extraction order.
#[derive(Debug, Default)]
pub struct AttachmentReport {
    pub saved: Vec<SavedAttachment>,
    pub failed: Vec<FailedAttachment>,
}

impl AttachmentReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.failed.is_empty()
    }
}

/// Fetches message `id` from `folder` and persists its attachments.
///
/// A missing message fails before anything is written. Each attachment is
/// saved independently; one failure does not stop the others.
pub async fn get_attachments(
    connection: &mut dyn MailConnection,
    store: &AttachmentStore,
    id: &str,
    folder: &str,
) -> Result<AttachmentReport> {
    connection.select(folder).await?;

    let raw = connection
        .fetch(id)
        .await?
        .ok_or_else(|| EmailError::MessageNotFound {
            id: id.to_string(),
            folder: folder.to_string(),
        })?;
    let message = decode_message(id, &raw)?;

    let mut report = AttachmentReport::default();
    if !message.has_attachment() {
        debug!("Message {} has no attachments", id);
        return Ok(report);
    }

    for record in message.attachments() {
        match store.persist(&record) {
            Ok(saved) => report.saved.push(saved),
            Err(e) => {
                error!(
                    "Failed to save attachment '{}' from message {}: {}",
                    record.filename, id, e
                );
                report.failed.push(FailedAttachment {
                    filename: record.filename,
                    error: e,
                });
            }
        }
    }

    debug!(
        "Message {}: {} attachments saved, {} failed",
        id,
        report.saved.len(),
        report.failed.len()
    );
    Ok(report)
}
