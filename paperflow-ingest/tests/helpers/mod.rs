//! Test Helper Utilities
//!
//! Shared fixtures for the paperflow-ingest integration tests

#![allow(dead_code)]

use paperflow_ingest::organizer::{DocumentOrganizer, FixedThreshold};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Write a document with `contents` into `dir`, creating `dir` if needed
pub fn write_doc(dir: &Path, name: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Organizer rooted at `root` with a fixed subfolder threshold
pub fn fixed_organizer(root: &Path, threshold: u32) -> Arc<DocumentOrganizer> {
    Arc::new(DocumentOrganizer::new(root, Arc::new(FixedThreshold(threshold))))
}

/// Regular files directly inside `dir`, by name
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Text of an EDF electricity invoice
pub const EDF_INVOICE: &str = "EDF\nFacture n° 2024-0017\nConsommation du 01/01/2024 au 31/01/2024\n\
                               Total TTC : 45,30 €\nEcheance : 15/02/2024";
