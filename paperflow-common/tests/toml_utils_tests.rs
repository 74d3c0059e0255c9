//! Unit tests for atomic write utilities
//!
//! - Atomic file operations (temp + rename), no temp file left behind
//! - Round-trip of every config section
//! - Permissions 0600 on Unix, and loose-permission detection

#[cfg(unix)]
use paperflow_common::config::check_toml_permissions_loose;
use paperflow_common::config::{
    load_toml_config, write_atomic, write_toml_config, LlmConfig, OcrConfig, OrganizerConfig,
    TomlConfig,
};
use paperflow_common::Error;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_config() -> TomlConfig {
    TomlConfig {
        root_folder: Some(PathBuf::from("/srv/papers")),
        inbox_folder: Some(PathBuf::from("/srv/scans")),
        ocr: OcrConfig {
            url: Some("http://127.0.0.1:8001".to_string()),
        },
        llm: LlmConfig {
            enabled: false,
            ..LlmConfig::default()
        },
        organizer: OrganizerConfig {
            threshold_documents: 5,
            adaptive_thresholds: false,
        },
        ..TomlConfig::default()
    }
}

#[test]
fn test_atomic_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("config.toml.tmp").exists());
}

#[test]
fn test_roundtrip_preserves_every_section() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    let config = sample_config();

    write_toml_config(&config, &target).unwrap();
    let parsed = load_toml_config(&target).unwrap();

    assert_eq!(parsed, config);
}

#[test]
fn test_rewrite_replaces_content() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    write_toml_config(&sample_config(), &target).unwrap();
    write_toml_config(&TomlConfig::default(), &target).unwrap();

    assert_eq!(load_toml_config(&target).unwrap(), TomlConfig::default());
}

#[test]
fn test_write_atomic_creates_parent_dirs() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("a/b/state.json");

    write_atomic(&target, b"{}").unwrap();
    write_atomic(&target, b"{\"v\":2}").unwrap();

    assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"v\":2}");
    assert!(!temp_dir.path().join("a/b/state.json.tmp").exists());
}

#[test]
fn test_write_atomic_rejects_path_without_file_name() {
    let err = write_atomic(Path::new("/"), b"x").unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
#[cfg(unix)]
fn test_atomic_write_sets_permissions_0600() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert!(!check_toml_permissions_loose(&target).unwrap());
}

#[test]
#[cfg(unix)]
fn test_check_permissions_detects_loose() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    std::fs::write(&target, "root_folder = \"/srv/papers\"").unwrap();
    let mut perms = std::fs::metadata(&target).unwrap().permissions();
    perms.set_mode(0o644);
    std::fs::set_permissions(&target, perms).unwrap();

    assert!(check_toml_permissions_loose(&target).unwrap());
}

#[test]
#[cfg(unix)]
fn test_loose_permissions_still_load() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    std::fs::write(&target, "root_folder = \"/srv/papers\"").unwrap();
    let mut perms = std::fs::metadata(&target).unwrap().permissions();
    perms.set_mode(0o644);
    std::fs::set_permissions(&target, perms).unwrap();

    // Loose permissions only warn
    let config = load_toml_config(&target).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/papers")));
}
