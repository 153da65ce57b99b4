use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use glob::Pattern;
use tracing::{debug, info, warn};

use crate::error::RenderError;

/// Renders single PDF pages to PNG files.
pub trait PdfRenderer: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, pdf: &Path) -> Result<usize, RenderError>;

    /// Renders page `page_index` (zero-based) to `output`.
    fn render_page(&self, pdf: &Path, page_index: usize, output: &Path) -> Result<(), RenderError>;
}

impl<R: PdfRenderer + ?Sized> PdfRenderer for Arc<R> {
    fn page_count(&self, pdf: &Path) -> Result<usize, RenderError> {
        (**self).page_count(pdf)
    }

    fn render_page(&self, pdf: &Path, page_index: usize, output: &Path) -> Result<(), RenderError> {
        (**self).render_page(pdf, page_index, output)
    }
}

/// Renderer backed by `lopdf` for page counts and poppler's `pdftoppm` for pixels.
pub struct PopplerRenderer {
    dpi: u32,
}

impl PopplerRenderer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }
}

impl PdfRenderer for PopplerRenderer {
    fn page_count(&self, pdf: &Path) -> Result<usize, RenderError> {
        match lopdf::Document::load(pdf) {
            Ok(doc) => Ok(doc.get_pages().len()),
            Err(e) => {
                // lopdf rejects some damaged xref tables that poppler still reads.
                warn!(
                    "lopdf failed to parse {}: {}. Falling back to pdfinfo.",
                    pdf.display(),
                    e
                );
                count_pages_with_pdfinfo(pdf).map_err(|fallback| match fallback {
                    RenderError::RendererUnavailable(_) => RenderError::InvalidPdf {
                        path: pdf.to_path_buf(),
                        reason: e.to_string(),
                    },
                    other => other,
                })
            }
        }
    }

    fn render_page(&self, pdf: &Path, page_index: usize, output: &Path) -> Result<(), RenderError> {
        let page_number = (page_index + 1).to_string();
        // pdftoppm appends ".png" to the prefix when -singlefile is set
        let prefix = output.with_extension("");

        let result = Command::new("pdftoppm")
            .arg("-png")
            .arg("-singlefile")
            .args(["-r", &self.dpi.to_string()])
            .args(["-f", &page_number, "-l", &page_number])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                RenderError::RendererUnavailable(format!(
                    "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                    e
                ))
            })?;

        if !result.status.success() {
            return Err(RenderError::PageFailed {
                path: pdf.to_path_buf(),
                page: page_index,
                reason: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let mut produced = prefix.into_os_string();
        produced.push(".png");
        let produced = PathBuf::from(produced);
        if produced != output {
            std::fs::rename(&produced, output).map_err(|e| RenderError::Io {
                path: output.to_path_buf(),
                source: e,
            })?;
        }

        Ok(())
    }
}

fn count_pages_with_pdfinfo(pdf: &Path) -> Result<usize, RenderError> {
    let output = Command::new("pdfinfo").arg(pdf).output().map_err(|e| {
        RenderError::RendererUnavailable(format!(
            "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(RenderError::InvalidPdf {
            path: pdf.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse::<usize>().ok())
        .ok_or_else(|| RenderError::InvalidPdf {
            path: pdf.to_path_buf(),
            reason: "pdfinfo reported no page count".to_string(),
        })
}

/// Longest stem, in bytes, used for page image names.
///
/// Leaves room for `_{pageIndex}.png` within the usual 255-byte name limit.
pub const MAX_STEM_BYTES: usize = 200;

/// Stem for the page images of `pdf`: its file stem cut to [`MAX_STEM_BYTES`]
/// on a character boundary.
pub fn page_stem(pdf: &Path) -> String {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "attachment".to_string());

    if stem.len() <= MAX_STEM_BYTES {
        return stem;
    }
    let mut end = MAX_STEM_BYTES;
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    stem[..end].to_string()
}

/// Renders PDFs into `{stem}_{pageIndex}.png` files and reuses complete earlier output.
pub struct RenderCache<R: PdfRenderer> {
    output_dir: PathBuf,
    renderer: R,
    // Page counts of sets this cache rendered or verified, keyed by stem.
    known_counts: Mutex<HashMap<String, usize>>,
}

impl<R: PdfRenderer> RenderCache<R> {
    pub fn new<P: AsRef<Path>>(output_dir: P, renderer: R) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            renderer,
            known_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Path of one page image.
    pub fn page_path(&self, stem: &str, page_index: usize) -> PathBuf {
        self.output_dir.join(format!("{}_{}.png", stem, page_index))
    }

    /// Page images for `pdf`, in page order.
    ///
    /// An existing set is reused only when it covers every page; anything
    /// partial is discarded and rendered again. Once a set has been rendered
    /// or verified, later calls check it against the recorded page count
    /// without opening the PDF again.
    pub fn render_pages(&self, pdf: &Path, stem: &str) -> Result<Vec<PathBuf>, RenderError> {
        let existing = self.existing_pages(stem)?;

        if !existing.is_empty() && self.known_count(stem) == Some(existing.len()) {
            debug!(
                "Reusing {} rendered pages for {}",
                existing.len(),
                pdf.display()
            );
            return Ok(existing);
        }

        let page_count = self.renderer.page_count(pdf)?;

        if page_count > 0 && existing.len() == page_count {
            debug!(
                "Reusing {} rendered pages for {}",
                page_count,
                pdf.display()
            );
            self.record_count(stem, page_count);
            return Ok(existing);
        }

        self.forget_count(stem);
        for stale in &existing {
            let _ = std::fs::remove_file(stale);
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|e| RenderError::Io {
            path: self.output_dir.clone(),
            source: e,
        })?;

        info!("Rendering {} pages of {}", page_count, pdf.display());

        let mut pages = Vec::with_capacity(page_count);
        for page_index in 0..page_count {
            let final_path = self.page_path(stem, page_index);
            let temp_path = self
                .output_dir
                .join(format!(".{}.png", uuid::Uuid::new_v4()));

            if let Err(e) = self.renderer.render_page(pdf, page_index, &temp_path) {
                let _ = std::fs::remove_file(&temp_path);
                for written in &pages {
                    let _ = std::fs::remove_file(written);
                }
                return Err(e);
            }

            std::fs::rename(&temp_path, &final_path).map_err(|e| RenderError::Io {
                path: final_path.clone(),
                source: e,
            })?;
            pages.push(final_path);
        }

        if page_count > 0 {
            self.record_count(stem, page_count);
        }
        Ok(pages)
    }

    fn known_count(&self, stem: &str) -> Option<usize> {
        self.known_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(stem).copied())
    }

    fn record_count(&self, stem: &str, page_count: usize) {
        if let Ok(mut counts) = self.known_counts.lock() {
            counts.insert(stem.to_string(), page_count);
        }
    }

    fn forget_count(&self, stem: &str) {
        if let Ok(mut counts) = self.known_counts.lock() {
            counts.remove(stem);
        }
    }

    /// Contiguous run of `{stem}_0.png`, `{stem}_1.png`, ... already on disk.
    fn existing_pages(&self, stem: &str) -> Result<Vec<PathBuf>, RenderError> {
        if !self.output_dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/{}_*.png",
            Pattern::escape(&self.output_dir.to_string_lossy()),
            Pattern::escape(stem)
        );
        let entries = glob::glob(&pattern).map_err(|e| RenderError::Io {
            path: self.output_dir.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        })?;

        let prefix = format!("{}_", stem);
        let mut indices: Vec<usize> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                name.strip_prefix(&prefix)?
                    .strip_suffix(".png")?
                    .parse::<usize>()
                    .ok()
            })
            .collect();
        indices.sort_unstable();

        Ok(indices
            .into_iter()
            .enumerate()
            .take_while(|(position, index)| position == index)
            .map(|(_, index)| self.page_path(stem, index))
            .collect())
    }
}
