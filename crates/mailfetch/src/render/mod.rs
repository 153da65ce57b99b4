//! PDF attachment rendering.

pub mod pdf;

pub use crate::error::RenderError;
pub use pdf::{page_stem, PdfRenderer, PopplerRenderer, RenderCache, MAX_STEM_BYTES};
