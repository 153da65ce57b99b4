//! Folder search with keyword filtering.

use log::debug;

use super::client::MailConnection;
use super::error::{EmailError, Result};
use super::mime::{decode_message, DecodedMessage};

/// Case-insensitive OR-filter over comma-separated keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    /// Splits on commas, trims, lowercases and drops blank entries.
    pub fn parse(filter: &str) -> Self {
        Self::from_keywords(filter.split(','))
    }

    pub fn from_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// True when any keyword occurs in `text`. An empty filter matches nothing.
    pub fn matches(&self, text: &str) -> bool {
        let folded = text.to_lowercase();
        self.keywords.iter().any(|k| folded.contains(k.as_str()))
    }
}

/// Parameters of one search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub folder: String,
    /// IMAP search criteria, passed through verbatim (e.g. "UNSEEN", "ALL").
    pub status_filter: String,
    pub keywords: KeywordFilter,
    /// Stop after this many matches.
    pub max_results: Option<usize>,
}

impl SearchRequest {
    pub fn new(
        folder: impl Into<String>,
        status_filter: impl Into<String>,
        keywords: KeywordFilter,
    ) -> Self {
        Self {
            folder: folder.into(),
            status_filter: status_filter.into(),
            keywords,
            max_results: None,
        }
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }
}

/// A matching message, decoded for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Raw `Date` header.
    pub date: Option<String>,
    pub body: String,
    pub has_attachment: bool,
}

impl MessageSummary {
    fn from_decoded(id: String, message: DecodedMessage) -> Self {
        let has_attachment = message.has_attachment();
        Self {
            id,
            subject: message.subject,
            from: message.from,
            to: message.to,
            date: message.date,
            body: message.body,
            has_attachment,
        }
    }
}

/// Selects the folder, searches it and keeps messages whose subject or body
/// contains a keyword. Results keep the server's order.
///
/// Any fetch or decode failure fails the whole search.
pub async fn search(
    connection: &mut dyn MailConnection,
    request: &SearchRequest,
) -> Result<Vec<MessageSummary>> {
    connection.select(&request.folder).await?;
    let ids = connection.search(&request.status_filter).await?;

    debug!(
        "{} candidates in '{}' for '{}'",
        ids.len(),
        request.folder,
        request.status_filter
    );

    let mut summaries = Vec::new();
    if request.keywords.is_empty() {
        return Ok(summaries);
    }

    for id in ids {
        if request.max_results.is_some_and(|max| summaries.len() >= max) {
            break;
        }

        let raw = connection
            .fetch(&id)
            .await?
            .ok_or_else(|| EmailError::Fetch {
                id: id.clone(),
                reason: "server returned no body for a searched message".to_string(),
            })?;
        let message = decode_message(&id, &raw)?;

        if request.keywords.matches(&message.searchable_text()) {
            debug!("Message {} matches", id);
            summaries.push(MessageSummary::from_decoded(id, message));
        }
    }

    Ok(summaries)
}
