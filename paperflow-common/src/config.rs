//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PAPERFLOW_ROOT`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_ENV_VAR: &str = "PAPERFLOW_ROOT";

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for organization journals; defaults to `{root}/logs`
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            journal_dir: None,
        }
    }
}

/// OCR collaborator endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OcrConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// LLM classification collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_llm_model(),
            enabled: true,
        }
    }
}

/// Deadline and retry budget applied to every collaborator call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaboratorConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Organizer section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizerConfig {
    /// Fixed subfolder threshold, used when adaptive thresholds are off
    #[serde(default = "default_threshold_documents")]
    pub threshold_documents: u32,
    #[serde(default = "default_true")]
    pub adaptive_thresholds: bool,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            threshold_documents: default_threshold_documents(),
            adaptive_thresholds: true,
        }
    }
}

/// Threshold manager persistence section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSection {
    /// Persist thresholds and decision history every N decisions
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            save_every: default_save_every(),
        }
    }
}

/// Classification fusion section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusionSection {
    /// LLM confidence strictly above which a disagreeing LLM wins
    #[serde(default = "default_override_confidence")]
    pub override_confidence: f64,
    #[serde(default = "default_override_cap")]
    pub override_cap: f64,
    #[serde(default = "default_agreement_cap")]
    pub agreement_cap: f64,
    #[serde(default = "default_agreement_boost")]
    pub agreement_boost: f64,
}

impl Default for FusionSection {
    fn default() -> Self {
        Self {
            override_confidence: default_override_confidence(),
            override_cap: default_override_cap(),
            agreement_cap: default_agreement_cap(),
            agreement_boost: default_agreement_boost(),
        }
    }
}

/// TOML configuration file contents
///
/// Every section is optional; missing sections fall back to defaults so a
/// partial or absent file never prevents startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub inbox_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub organizer: OrganizerConfig,
    #[serde(default)]
    pub thresholds: ThresholdSection,
    #[serde(default)]
    pub fusion: FusionSection,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_llm_model() -> String {
    "mistral".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_threshold_documents() -> u32 {
    3
}

fn default_save_every() -> usize {
    10
}

fn default_override_confidence() -> f64 {
    0.8
}

fn default_override_cap() -> f64 {
    0.95
}

fn default_agreement_cap() -> f64 {
    0.98
}

fn default_agreement_boost() -> f64 {
    1.2
}

/// Load a TOML config file
///
/// A missing file yields defaults with a warning; a file that exists but does
/// not parse is a configuration error. A file readable by group or other is
/// loaded with a warning.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    #[cfg(unix)]
    {
        if check_toml_permissions_loose(path)? {
            warn!(
                "Config file {} is readable by other users, consider chmod 600",
                path.display()
            );
        }
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Per-user config file location, whether or not it exists
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("paperflow").join("config.toml"))
}

/// Locate the platform config file, if one exists
pub fn default_config_file() -> Option<PathBuf> {
    if let Some(path) = user_config_file() {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/paperflow/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Write TOML config atomically (temp file + rename)
///
/// On Unix the file is restricted to 0600 since it may carry service URLs
/// with embedded credentials.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    write_atomic(path, content.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    Ok(())
}

/// Whole-file rewrite through a sibling temp file and rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("No file name in {}", path.display())))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// True if a config file is readable by group/other (Unix only)
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}

/// Resolves the root folder following the documented priority order
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_file: None,
        }
    }

    /// Command-line override (priority 1)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Explicit config file instead of the platform default (priority 3)
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
            if !path.trim().is_empty() {
                debug!(module = %self.module_name, "Root folder from {}", ROOT_ENV_VAR);
                return PathBuf::from(path);
            }
        }

        let config_path = self.config_file.clone().or_else(default_config_file);
        if let Some(config_path) = config_path {
            match load_toml_config(&config_path) {
                Ok(config) => {
                    if let Some(root) = config.root_folder {
                        debug!(module = %self.module_name, "Root folder from {}", config_path.display());
                        return root;
                    }
                }
                Err(e) => warn!("Ignoring unreadable config {}: {}", config_path.display(), e),
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout on first start
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root, inbox, journal, and config directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        for dir in [
            self.root_folder.clone(),
            self.inbox_path(),
            self.logs_path(),
            self.config_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Config(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Folder watched for incoming documents
    pub fn inbox_path(&self) -> PathBuf {
        self.root_folder.join("_inbox")
    }

    /// Folder holding the daily organization journals
    pub fn logs_path(&self) -> PathBuf {
        self.root_folder.join("logs")
    }

    /// Folder holding the threshold config and decision history
    pub fn config_dir(&self) -> PathBuf {
        self.root_folder.join(".paperflow")
    }
}

/// OS-dependent default root folder path
///
/// ~/Documents/paperflow where a documents dir is known, else ~/paperflow.
fn default_root_folder() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("paperflow"))
        .unwrap_or_else(|| PathBuf::from("./paperflow_data"))
}
