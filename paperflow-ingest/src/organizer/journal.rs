//! Append-only organization journal
//!
//! One JSON object per line in `{logs}/organization_{YYYYMMDD}.jsonl`.
//! Lines are only ever appended.

use super::OrganizerError;
use crate::types::Category;
use chrono::{DateTime, Utc};
use paperflow_common::time::day_stamp;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A newly organized document
    Document,
    /// An existing file moved by a retroactive sweep
    Sweep,
}

/// One filesystem move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationLogEntry {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub category: Category,
    pub emitter: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
}

/// Per-day JSONL writer
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Journal file holding entries stamped on `at`'s day
    pub fn path_for(&self, at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!("organization_{}.jsonl", day_stamp(at)))
    }

    pub fn append(&self, entry: &OrganizationLogEntry) -> Result<(), OrganizerError> {
        std::fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_string(entry)
            .map_err(|e| OrganizerError::Journal(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(entry.timestamp))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Entries of one day's journal, skipping unreadable lines
    pub fn read_day(&self, at: DateTime<Utc>) -> Result<Vec<OrganizationLogEntry>, OrganizerError> {
        let path = self.path_for(at);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
