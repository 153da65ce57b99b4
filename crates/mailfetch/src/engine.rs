//! The mail engine: one session, one attachment directory, one render cache.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

use crate::config::MailConfig;
use crate::email::{
    query, retrieval, AttachmentReport, EmailError, FailedAttachment, ImapConnector,
    MailConnector, MailSession, MessageSummary, Result, SearchRequest, ServerSettings,
};
use crate::render::{page_stem, PdfRenderer, PopplerRenderer, RenderCache};
use crate::storage::{AttachmentStore, SavedAttachment};

/// What to hand the chat user for one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The saved file itself.
    File(PathBuf),
    /// Rendered page images of a PDF, in page order.
    Pages(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub attachment: SavedAttachment,
    pub payload: Payload,
}

#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub deliveries: Vec<Delivery>,
    pub failed: Vec<FailedAttachment>,
}

impl DeliveryReport {
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.failed.is_empty()
    }
}

/// Entry point for the bot commands.
///
/// All mailbox commands go through one session guarded by a mutex, so at most
/// one command is in flight at a time. Share it with `Arc`.
pub struct MailEngine {
    session: Mutex<MailSession>,
    store: AttachmentStore,
    render_cache: Option<Arc<RenderCache<Arc<dyn PdfRenderer>>>>,
    default_folder: String,
    default_status: String,
}

impl MailEngine {
    /// Validates the configuration and builds an engine that talks IMAPS.
    ///
    /// No connection is made until the first command or [`MailEngine::connect`].
    pub fn new(config: &MailConfig) -> Result<Self> {
        Self::with_backends(
            config,
            Arc::new(ImapConnector),
            Arc::new(PopplerRenderer::new(config.render_dpi)),
        )
    }

    pub fn with_backends(
        config: &MailConfig,
        connector: Arc<dyn MailConnector>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Result<Self> {
        config.validate()?;

        let settings = ServerSettings {
            host: config.mail_host.clone(),
            port: config.mail_port,
            address: config.mail_address.clone(),
            password: config.resolve_password()?,
        };

        let render_cache = config
            .render_pdf
            .then(|| Arc::new(RenderCache::new(&config.attachments_dir, renderer)));

        Ok(Self {
            session: Mutex::new(MailSession::new(connector, settings)),
            store: AttachmentStore::new(&config.attachments_dir),
            render_cache,
            default_folder: config.default_folder.clone(),
            default_status: config.default_status.clone(),
        })
    }

    pub fn default_folder(&self) -> &str {
        &self.default_folder
    }

    pub fn default_status(&self) -> &str {
        &self.default_status
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    /// Logs in now instead of on first use.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session.acquire().await?;
        Ok(())
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<MessageSummary>> {
        let span = info_span!(
            "mail.search",
            folder = %request.folder,
            status = %request.status_filter
        );

        async {
            let mut session = self.session.lock().await;
            let connection = session.acquire().await?;
            let result = query::search(connection, request).await;
            session.release();

            if let Ok(summaries) = &result {
                info!("{} messages matched", summaries.len());
            }
            result
        }
        .instrument(span)
        .await
    }

    pub async fn get_attachments(&self, id: &str, folder: &str) -> Result<AttachmentReport> {
        let span = info_span!("mail.attachments", id = %id, folder = %folder);

        async {
            let mut session = self.session.lock().await;
            let connection = session.acquire().await?;
            let result = retrieval::get_attachments(connection, &self.store, id, folder).await;
            session.release();
            result
        }
        .instrument(span)
        .await
    }

    /// Saves the attachments of a message and renders PDFs to page images.
    ///
    /// A PDF that fails to render is delivered as the plain file instead.
    pub async fn deliver_attachments(&self, id: &str, folder: &str) -> Result<DeliveryReport> {
        let report = self.get_attachments(id, folder).await?;

        let mut deliveries = Vec::with_capacity(report.saved.len());
        for attachment in report.saved {
            let payload = self.payload_for(&attachment).await;
            deliveries.push(Delivery {
                attachment,
                payload,
            });
        }

        Ok(DeliveryReport {
            deliveries,
            failed: report.failed,
        })
    }

    async fn payload_for(&self, attachment: &SavedAttachment) -> Payload {
        let file = Payload::File(attachment.path.clone());
        let cache = match &self.render_cache {
            Some(cache) if is_pdf(attachment) => Arc::clone(cache),
            _ => return file,
        };

        let path = attachment.path.clone();
        let stem = page_stem(&path);
        let span = info_span!("render.pdf", file = %stem);

        // Page counting and pdftoppm block, so keep them off the async workers.
        let rendered = tokio::task::spawn_blocking(move || {
            span.in_scope(|| cache.render_pages(&path, &stem))
        })
        .await;

        match rendered {
            Ok(Ok(pages)) if !pages.is_empty() => Payload::Pages(pages),
            Ok(Ok(_)) => file,
            Ok(Err(e)) => {
                warn!("Sending '{}' without page images: {}", attachment.filename, e);
                file
            }
            Err(e) => {
                warn!("Rendering '{}' did not finish: {}", attachment.filename, e);
                file
            }
        }
    }

    /// Closes and logs out the session. Call exactly once, at host shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        self.session.lock().await.shutdown().await
    }
}

fn is_pdf(attachment: &SavedAttachment) -> bool {
    attachment.content_type == "application/pdf"
        || mime_guess::from_path(&attachment.filename).first_raw() == Some("application/pdf")
}
