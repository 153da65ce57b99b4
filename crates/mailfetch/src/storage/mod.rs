//! On-disk persistence of attachments.

pub mod attachments;

pub use attachments::{AttachmentStore, SavedAttachment};
