//! File moves
//!
//! Rename first; across filesystems fall back to copy + remove.

use std::io;
use std::path::Path;
use tracing::debug;

/// Moves one file; implementations must leave `from` intact on failure
pub trait FileMover: Send + Sync {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Filesystem mover used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMover;

impl FileMover for FsMover {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match std::fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                debug!(
                    from = %from.display(),
                    to = %to.display(),
                    "Cross-device rename, copying instead"
                );
                std::fs::copy(from, to)?;
                if let Err(e) = std::fs::remove_file(from) {
                    // Keep a single copy: undo the copy, the source is still there
                    let _ = std::fs::remove_file(to);
                    return Err(e);
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV
    e.raw_os_error() == Some(18)
}

#[cfg(windows)]
fn is_cross_device(e: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    e.raw_os_error() == Some(17)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rename_moves_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a.pdf");
        let to = dir.path().join("b.pdf");
        std::fs::write(&from, b"content").unwrap();

        FsMover.move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"content");
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = FsMover.move_file(&dir.path().join("gone.pdf"), &dir.path().join("b.pdf"));
        assert!(result.is_err());
        assert!(!dir.path().join("b.pdf").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_exdev_detected() {
        assert!(is_cross_device(&io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device(&io::Error::from_raw_os_error(2)));
    }
}
