//! Retroactive sweep
//!
//! When an emitter subfolder is created, files already filed at the
//! category level whose name contains the emitter name are moved into it.
//! The match is a plain substring test on normalized names and will
//! sometimes catch unrelated files (`EDF` inside `MEDFORD`); every move is
//! logged so it can be reviewed.

use super::mover::FileMover;
use super::naming::unique_destination;
use crate::text::normalize_for_match;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Emitter names shorter than this never trigger a sweep
pub const MIN_SWEEP_NAME_LEN: usize = 3;

#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// (from, to) for each moved file
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub failures: usize,
}

fn match_key(s: &str) -> String {
    normalize_for_match(s)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Case- and accent-insensitive substring test of `emitter` in `file_name`
pub fn matches_emitter(file_name: &str, emitter: &str) -> bool {
    let needle = match_key(emitter);
    !needle.is_empty() && match_key(file_name).contains(&needle)
}

/// Move matching regular files of `category_dir` into `subfolder`
///
/// `exclude` is never moved. Per-file failures are warned and skipped.
pub fn sweep_into(
    category_dir: &Path,
    subfolder: &Path,
    emitter: &str,
    exclude: &Path,
    mover: &dyn FileMover,
) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();

    if emitter.chars().count() < MIN_SWEEP_NAME_LEN {
        warn!(emitter, "Emitter name too short, retroactive sweep skipped");
        return outcome;
    }

    let candidates: Vec<PathBuf> = WalkDir::new(category_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Error reading category folder during sweep");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path != exclude)
        .filter(|path| {
            path.file_name()
                .map(|n| matches_emitter(&n.to_string_lossy(), emitter))
                .unwrap_or(false)
        })
        .collect();

    for from in candidates {
        let file_name = match from.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        let to = unique_destination(subfolder, &file_name);
        match mover.move_file(&from, &to) {
            Ok(()) => outcome.moved.push((from, to)),
            Err(e) => {
                warn!(
                    from = %from.display(),
                    to = %to.display(),
                    error = %e,
                    "Sweep move failed, skipping file"
                );
                outcome.failures += 1;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizer::mover::FsMover;
    use tempfile::TempDir;

    #[test]
    fn test_matches_emitter() {
        assert!(matches_emitter("facture_edf_2024.pdf", "EDF"));
        assert!(matches_emitter("Free Mobile mars.pdf", "Free_Mobile"));
        assert!(matches_emitter("Société Générale.pdf", "Societe_Generale"));
        assert!(!matches_emitter("facture_engie.pdf", "EDF"));
        assert!(!matches_emitter("x.pdf", ""));
    }

    #[test]
    fn test_sweep_moves_matching_files_only() {
        let dir = TempDir::new().unwrap();
        let category = dir.path().join("factures");
        let sub = category.join("EDF");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(category.join("edf_janvier.pdf"), b"1").unwrap();
        std::fs::write(category.join("EDF_fevrier.pdf"), b"2").unwrap();
        std::fs::write(category.join("engie.pdf"), b"3").unwrap();

        let outcome = sweep_into(&category, &sub, "EDF", Path::new("/nowhere"), &FsMover);
        assert_eq!(outcome.moved.len(), 2);
        assert_eq!(outcome.failures, 0);
        assert!(sub.join("edf_janvier.pdf").exists());
        assert!(sub.join("EDF_fevrier.pdf").exists());
        assert!(category.join("engie.pdf").exists());
    }

    #[test]
    fn test_short_emitter_not_swept() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("AB");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(dir.path().join("ab_1.pdf"), b"1").unwrap();

        let outcome = sweep_into(dir.path(), &sub, "AB", Path::new("/nowhere"), &FsMover);
        assert!(outcome.moved.is_empty());
        assert!(dir.path().join("ab_1.pdf").exists());
    }

    #[test]
    fn test_excluded_file_stays() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("EDF");
        std::fs::create_dir_all(&sub).unwrap();
        let keep = dir.path().join("edf_new.pdf");
        std::fs::write(&keep, b"1").unwrap();

        let outcome = sweep_into(dir.path(), &sub, "EDF", &keep, &FsMover);
        assert!(outcome.moved.is_empty());
        assert!(keep.exists());
    }
}
