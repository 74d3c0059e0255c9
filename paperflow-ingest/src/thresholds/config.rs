//! Persisted threshold configuration
//!
//! Stored as `threshold_config.json`:
//! ```json
//! {"thresholds": {"default": 3, "factures": 3, ...},
//!  "last_updated": "2026-01-01T00:00:00Z",
//!  "performance_metrics": {...}}
//! ```

use super::ThresholdError;
use crate::types::Category;
use chrono::{DateTime, Utc};
use paperflow_common::config::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Key of the fallback threshold
pub const DEFAULT_KEY: &str = "default";

/// File name of the threshold configuration inside the config dir
pub const CONFIG_FILE: &str = "threshold_config.json";

/// File name of the decision history inside the config dir
pub const HISTORY_FILE: &str = "decision_history.json";

/// Hard-coded defaults, overlaid by the persisted file
pub fn default_thresholds() -> BTreeMap<String, u32> {
    [
        (DEFAULT_KEY, 3),
        ("factures", 3),
        ("rib", 2),
        ("releves_bancaires", 3),
        ("contrats", 2),
        ("attestations", 3),
        ("courriers", 5),
        ("rapports", 4),
        ("impots", 2),
        ("assurances", 3),
        ("cartes_transport", 2),
        ("documents_personnels", 5),
        ("non_classes", 10),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Aggregate figures written next to the thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub total_decisions: u64,
    #[serde(default)]
    pub subfolders_recommended: u64,
    #[serde(default)]
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub thresholds: BTreeMap<String, u32>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub performance_metrics: PerformanceMetrics,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
            last_updated: Utc::now(),
            performance_metrics: PerformanceMetrics::default(),
        }
    }
}

impl ThresholdConfig {
    /// Threshold for a category, falling back to `default`
    pub fn threshold_for(&self, category: &Category) -> u32 {
        self.thresholds
            .get(category.as_str())
            .or_else(|| self.thresholds.get(DEFAULT_KEY))
            .copied()
            .unwrap_or(3)
            .max(1)
    }

    pub fn set(&mut self, category: &Category, value: u32) {
        self.thresholds.insert(category.as_str().to_string(), value);
        self.last_updated = Utc::now();
    }

    /// Load from `path` over the hard-coded defaults
    ///
    /// A missing file yields the defaults; a malformed file or a zero
    /// threshold is an error.
    pub fn load(path: &Path) -> Result<Self, ThresholdError> {
        if !path.exists() {
            debug!(path = %path.display(), "No threshold config, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let stored: ThresholdConfig = serde_json::from_str(&content)
            .map_err(|e| ThresholdError::Malformed(path.to_path_buf(), e.to_string()))?;

        if let Some((key, _)) = stored.thresholds.iter().find(|(_, v)| **v == 0) {
            return Err(ThresholdError::Malformed(
                path.to_path_buf(),
                format!("threshold for '{}' must be at least 1", key),
            ));
        }

        let mut config = Self::default();
        config.thresholds.extend(stored.thresholds);
        config.last_updated = stored.last_updated;
        config.performance_metrics = stored.performance_metrics;

        info!(
            path = %path.display(),
            categories = config.thresholds.len(),
            "Threshold config loaded"
        );
        Ok(config)
    }

    /// Whole-file atomic rewrite
    pub fn save(&self, path: &Path) -> Result<(), ThresholdError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ThresholdError::Malformed(path.to_path_buf(), e.to_string()))?;
        write_atomic(path, &json)?;
        Ok(())
    }
}
