use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::email::mime::AttachmentRecord;
use crate::email::{EmailError, Result};

/// An attachment that exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedAttachment {
    /// Decoded name shown to users.
    pub filename: String,
    /// Absolute location of the file.
    pub path: PathBuf,
    pub content_type: String,
}

/// Writes attachments under a single directory, one file per filename.
///
/// The same filename always maps to the same path, so saving an attachment a
/// second time is a no-op.
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an attachment with this display name is stored at.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(stored_file_name(filename))
    }

    /// Saves the record unless a file with its name already exists.
    pub fn persist(&self, record: &AttachmentRecord) -> Result<SavedAttachment> {
        let path = self.path_for(&record.filename);

        // symlink_metadata so a dangling link still counts as taken
        if std::fs::symlink_metadata(&path).is_ok() {
            if !path.is_file() {
                return Err(EmailError::Persist {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "target exists and is not a regular file",
                    ),
                });
            }
            debug!("Attachment already saved at {}", path.display());
        } else {
            self.ensure_root()?;
            write_atomically(&path, &record.data)?;
            debug!(
                "Saved attachment '{}' ({} bytes) to {}",
                record.filename,
                record.data.len(),
                path.display()
            );
        }

        Ok(SavedAttachment {
            filename: record.filename.clone(),
            path: absolute(&path)?,
            content_type: record.content_type.clone(),
        })
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| EmailError::Persist {
                path: self.root.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Writes to a hidden sibling first and renames it into place, so readers
/// never see a partially written file.
fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    // Fixed length, so any name that fits the filesystem also has a temp name that fits.
    let temp_path = dir.join(format!(".{}.part", uuid::Uuid::new_v4()));

    let persist_error = |source| EmailError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let written = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(persist_error(e));
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        persist_error(e)
    })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| EmailError::Persist {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Maps a display name to a name that is safe as a single path component.
///
/// Deterministic: the same input always yields the same output.
pub fn stored_file_name(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');

    if cleaned.is_empty() {
        return "attachment".to_string();
    }

    truncate_preserving_extension(cleaned, 255)
}

/// Shortens a name to at most `max_bytes`, keeping a short extension intact.
fn truncate_preserving_extension(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let ext = match name.rfind('.') {
        Some(dot) if name.len() - dot <= 16 => &name[dot..],
        _ => "",
    };

    let mut end = max_bytes - ext.len();
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &name[..end], ext)
}
