//! Persist attachments under a per-subject folder.

use std::path::{Path, PathBuf};

use humansize::{format_size, BINARY};
use tracing::info;

use crate::config::CollisionPolicy;
use crate::error::{MailError, Result};

/// Writes attachment payloads to `<root>/<sanitized-subject>/<filename>`.
#[derive(Debug, Clone)]
pub struct AttachmentWriter {
    root: PathBuf,
    on_collision: CollisionPolicy,
}

impl AttachmentWriter {
    pub fn new(root: impl Into<PathBuf>, on_collision: CollisionPolicy) -> Self {
        Self {
            root: root.into(),
            on_collision,
        }
    }

    /// Folder that holds the attachments of a message with this subject.
    pub fn target_dir(&self, subject: &str) -> PathBuf {
        self.root.join(folder_name(subject))
    }

    /// Write one attachment, creating the subject folder on first use.
    ///
    /// With [`CollisionPolicy::Overwrite`] an existing file is replaced, so
    /// writing the same message twice leaves identical files behind.
    pub fn write(&self, subject: &str, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let name = safe_filename(filename).ok_or_else(|| {
            MailError::io(
                filename,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "unusable filename"),
            )
        })?;

        let dir = self.target_dir(subject);
        std::fs::create_dir_all(&dir).map_err(|e| MailError::io(&dir, e))?;

        let path = dir.join(name);
        let path = match self.on_collision {
            CollisionPolicy::Overwrite => path,
            CollisionPolicy::Number => unique_path(&path),
        };

        std::fs::write(&path, data).map_err(|e| MailError::io(&path, e))?;
        info!(
            path = %path.display(),
            size = %format_size(data.len() as u64, BINARY),
            "Saved attachment"
        );
        Ok(path)
    }
}

/// Folder name for a subject: alphanumerics kept, everything else `_`.
pub fn folder_name(subject: &str) -> String {
    let cleaned: String = subject
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "no_subject".to_string()
    } else {
        cleaned
    }
}

/// Reduce a sender-supplied filename to its last path component.
///
/// Returns `None` for names that cannot be a plain file (`""`, `.`, `..`).
fn safe_filename(filename: &str) -> Option<&str> {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    match last {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    let numbered = |suffix: &str| {
        if ext.is_empty() {
            parent.join(format!("{stem}_{suffix}"))
        } else {
            parent.join(format!("{stem}_{suffix}.{ext}"))
        }
    };

    for i in 1..1000 {
        let candidate = numbered(&i.to_string());
        if !candidate.exists() {
            return candidate;
        }
    }

    numbered("dup")
}
