//! Collision-free destination names

use chrono::{DateTime, Utc};
use paperflow_common::time::backup_stamp;
use std::path::{Path, PathBuf};

/// Split `name.ext` into (`name`, `.ext`); dotfiles keep their name
fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

/// First free path among `dir/name.ext`, `dir/name_1.ext`, `dir/name_2.ext`, ...
///
/// Idempotent as long as nothing is written to `dir` in between.
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = split_name(file_name);
    let mut n: u32 = 1;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// `name_backup_{YYYYmmdd_HHMMSS}.ext` next to `path`
pub fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_name(&file_name);
    path.with_file_name(format!("{}_backup_{}{}", stem, backup_stamp(at), ext))
}

/// Copy an existing `destination` aside before it is overwritten
///
/// Guards against writers outside this process that fill a resolved name
/// before the move lands. Returns the backup path when a copy was made.
pub fn backup_existing(destination: &Path, at: DateTime<Utc>) -> std::io::Result<Option<PathBuf>> {
    if !destination.exists() {
        return Ok(None);
    }
    let backup = backup_path(destination, at);
    std::fs::copy(destination, &backup)?;
    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_free_name_unchanged() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            unique_destination(dir.path(), "facture.pdf"),
            dir.path().join("facture.pdf")
        );
    }

    #[test]
    fn test_collision_suffixes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("facture.pdf"), b"a").unwrap();
        assert_eq!(
            unique_destination(dir.path(), "facture.pdf"),
            dir.path().join("facture_1.pdf")
        );

        std::fs::write(dir.path().join("facture_1.pdf"), b"b").unwrap();
        assert_eq!(
            unique_destination(dir.path(), "facture.pdf"),
            dir.path().join("facture_2.pdf")
        );
    }

    #[test]
    fn test_no_extension_and_dotfile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("scan"), b"a").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"a").unwrap();
        assert_eq!(unique_destination(dir.path(), "scan"), dir.path().join("scan_1"));
        assert_eq!(
            unique_destination(dir.path(), ".hidden"),
            dir.path().join(".hidden_1")
        );
    }

    #[test]
    fn test_multi_dot_keeps_last_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("releve.2024.pdf"), b"a").unwrap();
        assert_eq!(
            unique_destination(dir.path(), "releve.2024.pdf"),
            dir.path().join("releve.2024_1.pdf")
        );
    }

    #[test]
    fn test_backup_path() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            backup_path(Path::new("/x/facture.pdf"), at),
            PathBuf::from("/x/facture_backup_20240309_140507.pdf")
        );
    }

    #[test]
    fn test_backup_existing_copies_outside_write() {
        let dir = TempDir::new().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let destination = unique_destination(dir.path(), "facture.pdf");
        assert_eq!(backup_existing(&destination, at).unwrap(), None);

        // Another process writes the resolved name before the move
        std::fs::write(&destination, b"other writer").unwrap();
        let backup = backup_existing(&destination, at).unwrap().unwrap();
        assert_eq!(backup, dir.path().join("facture_backup_20240309_140507.pdf"));
        assert_eq!(std::fs::read(&backup).unwrap(), b"other writer");
        assert!(destination.exists());
    }
}
