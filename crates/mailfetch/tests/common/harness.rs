//! Isolated engine setup for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use mailfetch::render::{PdfRenderer, RenderError};
use mailfetch::{MailConfig, MailEngine};

use super::fake_server::FakeMailServer;

/// Renderer that trusts lopdf for page counts and writes placeholder PNGs.
#[derive(Default)]
pub struct CountingRenderer {
    renders: AtomicUsize,
}

impl CountingRenderer {
    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl PdfRenderer for CountingRenderer {
    fn page_count(&self, pdf: &Path) -> Result<usize, RenderError> {
        lopdf::Document::load(pdf)
            .map(|doc| doc.get_pages().len())
            .map_err(|e| RenderError::InvalidPdf {
                path: pdf.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn render_page(&self, _pdf: &Path, page_index: usize, output: &Path) -> Result<(), RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output, format!("png page {}", page_index)).map_err(|source| {
            RenderError::Io {
                path: output.to_path_buf(),
                source,
            }
        })
    }
}

/// Temp directory, fake mailbox and counting renderer behind one engine.
pub struct TestHarness {
    temp_dir: TempDir,
    pub attachments_dir: PathBuf,
    pub server: FakeMailServer,
    pub renderer: Arc<CountingRenderer>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let attachments_dir = temp_dir.path().join("attachments");

        Self {
            temp_dir,
            attachments_dir,
            server: FakeMailServer::new(),
            renderer: Arc::new(CountingRenderer::default()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> MailConfig {
        MailConfig::new("imap.example.com", 993, "me@example.com", "app-password")
            .with_attachments_dir(&self.attachments_dir)
    }

    pub fn engine(&self) -> MailEngine {
        self.engine_with(self.config())
    }

    pub fn engine_with(&self, config: MailConfig) -> MailEngine {
        MailEngine::with_backends(
            &config,
            Arc::new(self.server.clone()),
            Arc::clone(&self.renderer) as Arc<dyn PdfRenderer>,
        )
        .expect("Failed to build engine")
    }

    /// Names of the files in the attachments directory, sorted.
    pub fn stored_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.attachments_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
