//! Document filing
//!
//! - `document_organizer`: destination choice, lazy subfolders, moves, counters
//! - `sweep`: retroactive move of earlier files into a new emitter subfolder
//! - `naming`: collision-free destination names and backups
//! - `journal`: per-day JSONL record of every move
//! - `mover`: rename with cross-device copy fallback

pub mod document_organizer;
pub mod journal;
pub mod mover;
pub mod naming;
pub mod sweep;

pub use document_organizer::{
    DocumentOrganizer, OrganizationResult, OrganizationStats, OrganizationType, COUNTS_FILE,
};
pub use journal::{EntryKind, Journal, OrganizationLogEntry};
pub use mover::{FileMover, FsMover};

use crate::thresholds::ThresholdManager;
use crate::types::{Category, EmitterInfo};
use std::path::PathBuf;
use thiserror::Error;

/// Subfolder policy consulted by the organizer
pub trait FolderThreshold: Send + Sync {
    /// Whether `emitter` deserves its own folder given `current_count`
    /// documents already filed for it in `category`
    fn should_create_subfolder(
        &self,
        category: &Category,
        emitter: &EmitterInfo,
        current_count: u32,
    ) -> bool;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Same threshold for every category and emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedThreshold(pub u32);

impl FolderThreshold for FixedThreshold {
    fn should_create_subfolder(
        &self,
        _category: &Category,
        _emitter: &EmitterInfo,
        current_count: u32,
    ) -> bool {
        current_count >= self.0
    }

    fn describe(&self) -> String {
        format!("fixed({})", self.0)
    }
}

impl FolderThreshold for ThresholdManager {
    fn should_create_subfolder(
        &self,
        category: &Category,
        emitter: &EmitterInfo,
        current_count: u32,
    ) -> bool {
        ThresholdManager::should_create_subfolder(
            self,
            category,
            &emitter.normalized_name,
            current_count,
            Some(emitter),
        )
        .should_create
    }

    fn describe(&self) -> String {
        "adaptive".to_string()
    }
}

/// Organizer failure, rendered into [`OrganizationResult::error`]
#[derive(Debug, Error)]
pub enum OrganizerError {
    #[error("Source document not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Source is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("No emitter supplied")]
    MissingEmitter,

    #[error("Failed to create folder {}: {1}", .0.display())]
    CreateFolder(PathBuf, #[source] std::io::Error),

    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Emitter counts file {}: {1}", .0.display())]
    Counts(PathBuf, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
