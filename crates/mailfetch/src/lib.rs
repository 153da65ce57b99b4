pub mod commands;
pub mod config;
pub mod email;
pub mod engine;
pub mod error;
pub mod render;
pub mod storage;
pub mod telemetry;

pub use config::{load_config, load_config_from_str, MailConfig};
pub use email::{
    AttachmentReport, EmailError, KeywordFilter, MailConnection, MailConnector, MailSession,
    MessageSummary, SearchRequest,
};
pub use engine::{Delivery, DeliveryReport, MailEngine, Payload};
pub use error::{ConfigError, MailfetchError, RenderError, Result};
pub use render::{PdfRenderer, PopplerRenderer, RenderCache};
pub use storage::{AttachmentStore, SavedAttachment};
