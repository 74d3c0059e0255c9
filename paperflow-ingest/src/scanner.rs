//! Inbox scanner
//!
//! Recursive document discovery with format validation. Hidden files and
//! system clutter are skipped; binary formats must carry the magic bytes of
//! their extension.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extensions accepted in the inbox
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tif", "tiff", "txt"];

/// Inbox scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// Scan result with statistics
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Documents found, sorted by path
    pub files: Vec<PathBuf>,
    /// Count of documents by extension
    pub by_format: BTreeMap<String, usize>,
    /// Candidates rejected (wrong magic bytes, unreadable, too recent)
    pub skipped: usize,
}

/// Inbox document scanner
pub struct InboxScanner {
    ignore_patterns: Vec<String>,
    min_age: Duration,
}

impl InboxScanner {
    /// Scanner with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, desktop.ini and
    /// partial downloads.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "desktop.ini".to_string(),
                ".part".to_string(),
                ".crdownload".to_string(),
            ],
            min_age: Duration::ZERO,
        }
    }

    /// Skip files modified more recently than `age` (still being written)
    pub fn with_min_age(mut self, age: Duration) -> Self {
        self.min_age = age;
        self
    }

    /// Documents under `root`, sorted by path, with per-format counts
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut result = ScanResult::default();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Error accessing inbox entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(ext) = accepted_extension(path) else {
                continue;
            };

            if !self.old_enough(&entry) {
                tracing::debug!(path = %path.display(), "Skipping file still being written");
                result.skipped += 1;
                continue;
            }

            match verify_format(path, &ext) {
                Ok(true) => {
                    *result.by_format.entry(ext).or_insert(0) += 1;
                    result.files.push(path.to_path_buf());
                }
                Ok(false) => {
                    tracing::warn!(path = %path.display(), "Content does not match extension, skipping");
                    result.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Error verifying file");
                    result.skipped += 1;
                }
            }
        }

        tracing::debug!(
            root = %root.display(),
            found = result.files.len(),
            skipped = result.skipped,
            "Inbox scan complete"
        );
        Ok(result)
    }

    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        let file_name = entry.file_name().to_string_lossy();

        if file_name.starts_with('.') {
            return false;
        }
        if self.ignore_patterns.iter().any(|p| file_name.contains(p.as_str())) {
            return false;
        }

        // Detect symlink loops
        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!(path = %entry.path().display(), "Symlink loop detected");
                    return false;
                }
            }
        }

        true
    }

    fn old_enough(&self, entry: &DirEntry) -> bool {
        if self.min_age.is_zero() {
            return true;
        }
        entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age >= self.min_age)
            .unwrap_or(true)
    }
}

impl Default for InboxScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-case extension if it is accepted
fn accepted_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    ACCEPTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Check magic bytes against the extension; text files only need to be UTF-8-ish
fn verify_format(path: &Path, ext: &str) -> std::io::Result<bool> {
    if ext == "txt" {
        return Ok(true);
    }
    let kind = infer::get_from_path(path)?;
    let Some(kind) = kind else {
        return Ok(false);
    };
    let matches = match ext {
        "pdf" => kind.mime_type() == "application/pdf",
        "png" => kind.mime_type() == "image/png",
        "jpg" | "jpeg" => kind.mime_type() == "image/jpeg",
        "tif" | "tiff" => kind.mime_type() == "image/tiff",
        _ => false,
    };
    Ok(matches)
}
