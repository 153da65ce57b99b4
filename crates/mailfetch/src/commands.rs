//! Chat commands: `query` and `fetch-attachments`.
//!
//! Handlers never return errors to the chat. Failures are logged with their
//! full cause and turned into a short reply.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::DateTime;
use log::error;

use crate::email::{KeywordFilter, MessageSummary, SearchRequest};
use crate::engine::{Delivery, MailEngine, Payload};

/// Bodies longer than this are cut in the query reply.
const MAX_BODY_CHARS: usize = 1000;

// ============================================================================
// Query
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    /// Comma-separated keywords.
    pub keywords: String,
    pub status: Option<String>,
    pub folder: Option<String>,
}

pub async fn query(engine: &MailEngine, args: &QueryArgs) -> String {
    let keywords = KeywordFilter::parse(&args.keywords);
    if keywords.is_empty() {
        return "Please give at least one keyword, e.g. `invoice,receipt`.".to_string();
    }

    let folder = args
        .folder
        .as_deref()
        .unwrap_or_else(|| engine.default_folder());
    let status = args
        .status
        .as_deref()
        .unwrap_or_else(|| engine.default_status());
    let request = SearchRequest::new(folder, status, keywords);

    match engine.search(&request).await {
        Ok(summaries) => format_query_reply(&args.keywords, &summaries),
        Err(e) => {
            error!("Mail query for '{}' failed: {:?}", args.keywords, e);
            format!("Mail query failed: {}", e.user_message())
        }
    }
}

/// One header line, then a section per message.
pub fn format_query_reply(keywords: &str, summaries: &[MessageSummary]) -> String {
    let mut reply = format!(
        "Found {} {} matching '{}'",
        summaries.len(),
        if summaries.len() == 1 { "message" } else { "messages" },
        keywords.trim()
    );

    for summary in summaries {
        reply.push_str("\n\n");
        let _ = writeln!(reply, "[{}] {}", summary.id, display_subject(&summary.subject));
        let _ = writeln!(reply, "From: {}", summary.from.as_deref().unwrap_or("(unknown)"));
        let _ = writeln!(reply, "Date: {}", display_date(summary.date.as_deref()));
        let _ = writeln!(reply, "{}", truncate_body(&summary.body));
        let _ = write!(
            reply,
            "Attachments: {}",
            if summary.has_attachment { "yes" } else { "no" }
        );
    }

    reply
}

fn display_subject(subject: &str) -> &str {
    if subject.trim().is_empty() {
        "(no subject)"
    } else {
        subject
    }
}

/// RFC 2822 dates are shown normalised; anything else verbatim.
fn display_date(raw: Option<&str>) -> String {
    match raw {
        Some(raw) => DateTime::parse_from_rfc2822(raw.trim())
            .map(|d| d.format("%Y-%m-%d %H:%M %:z").to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => "(unknown)".to_string(),
    }
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

// ============================================================================
// Fetch attachments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredItem {
    pub filename: String,
    pub path: PathBuf,
    /// Files to send: the attachment itself or its page images.
    pub files: Vec<PathBuf>,
}

impl From<Delivery> for DeliveredItem {
    fn from(delivery: Delivery) -> Self {
        let files = match delivery.payload {
            Payload::File(path) => vec![path],
            Payload::Pages(pages) => pages,
        };
        Self {
            filename: delivery.attachment.filename,
            path: delivery.attachment.path,
            files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentsReply {
    NoIdentifier,
    NoAttachments,
    Delivered {
        items: Vec<DeliveredItem>,
        /// Display names that could not be saved.
        failed: Vec<String>,
    },
    Failed(String),
}

impl AttachmentsReply {
    pub fn text(&self) -> String {
        match self {
            Self::NoIdentifier => "Please give the id of the message.".to_string(),
            Self::NoAttachments => "No attachments found.".to_string(),
            Self::Delivered { items, failed } => {
                let mut text = String::new();
                for item in items {
                    let _ = writeln!(text, "{}: {}", item.filename, item.path.display());
                }
                if !failed.is_empty() {
                    let _ = writeln!(text, "Could not save: {}", failed.join(", "));
                }
                text.trim_end().to_string()
            }
            Self::Failed(message) => format!("Fetching attachments failed: {}", message),
        }
    }
}

pub async fn fetch_attachments(
    engine: &MailEngine,
    id: Option<&str>,
    folder: Option<&str>,
) -> AttachmentsReply {
    let id = match id.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return AttachmentsReply::NoIdentifier,
    };
    let folder = folder.unwrap_or_else(|| engine.default_folder());

    match engine.deliver_attachments(id, folder).await {
        Ok(report) if report.is_empty() => AttachmentsReply::NoAttachments,
        Ok(report) => {
            for failed in &report.failed {
                error!("Attachment '{}' of message {}: {:?}", failed.filename, id, failed.error);
            }
            AttachmentsReply::Delivered {
                items: report.deliveries.into_iter().map(DeliveredItem::from).collect(),
                failed: report.failed.into_iter().map(|f| f.filename).collect(),
            }
        }
        Err(e) => {
            error!("Fetching attachments of message {} failed: {:?}", id, e);
            AttachmentsReply::Failed(e.user_message())
        }
    }
}
