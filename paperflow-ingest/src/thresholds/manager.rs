//! Threshold Manager
//!
//! Stateful decision service. All state (configuration, per-emitter
//! analytics, decision history) lives behind one mutex; each decision is a
//! single critical section so concurrent callers never interleave a
//! snapshot with another caller's update.
//!
//! **Look-back:** a decision is computed from the emitter's analytics as
//! they stood before the call; the call is folded in afterwards.

use super::analytics::{self, Adjustment, EmitterAnalytics};
use super::config::{ThresholdConfig, CONFIG_FILE, HISTORY_FILE};
use super::ThresholdError;
use crate::types::{Category, EmitterInfo};
use chrono::{DateTime, Utc};
use paperflow_common::config::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Decision records kept (oldest dropped first)
pub const MAX_HISTORY: usize = 1000;

/// Default number of decisions between automatic saves
pub const DEFAULT_SAVE_EVERY: usize = 10;

/// Decisions per category needed before suggesting a change
const MIN_SUGGESTION_SAMPLES: usize = 5;

/// Outcome of one threshold evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdDecision {
    pub should_create: bool,
    pub base_threshold: u32,
    pub adjusted_threshold: u32,
    pub confidence: f64,
    /// Human-readable adjustment reasons, in evaluation order
    pub reasons: Vec<String>,
}

/// Persisted trace of a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub category: Category,
    pub emitter: String,
    pub current_count: u32,
    pub base_threshold: u32,
    pub adjusted_threshold: u32,
    pub should_create: bool,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Proposed threshold change for a category
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSuggestion {
    pub category: Category,
    pub current: u32,
    pub suggested: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryDecisionStats {
    pub decisions: usize,
    pub created: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThresholdStatistics {
    pub total_decisions: usize,
    pub subfolders_recommended: usize,
    /// `subfolders_recommended / total_decisions`, 0 when empty
    pub creation_rate: f64,
    pub average_confidence: f64,
    pub tracked_emitters: usize,
    pub by_category: BTreeMap<String, CategoryDecisionStats>,
}

struct ManagerState {
    config: ThresholdConfig,
    analytics: HashMap<String, EmitterAnalytics>,
    history: VecDeque<DecisionRecord>,
    unsaved: usize,
}

/// Adaptive threshold decision service
pub struct ThresholdManager {
    config_dir: Option<PathBuf>,
    save_every: usize,
    state: Mutex<ManagerState>,
}

impl ThresholdManager {
    /// In-memory manager over the hard-coded defaults, never persisted
    pub fn new() -> Self {
        Self::from_parts(None, DEFAULT_SAVE_EVERY, ThresholdConfig::default(), VecDeque::new())
    }

    /// Load configuration and history from `config_dir`
    ///
    /// Missing files mean defaults and empty history. Analytics are rebuilt
    /// by replaying the stored history.
    pub fn load(config_dir: impl Into<PathBuf>, save_every: usize) -> Result<Self, ThresholdError> {
        let config_dir = config_dir.into();
        let config = ThresholdConfig::load(&config_dir.join(CONFIG_FILE))?;
        let history = load_history(&config_dir.join(HISTORY_FILE))?;

        info!(
            config_dir = %config_dir.display(),
            decisions = history.len(),
            save_every,
            "Threshold manager loaded"
        );
        Ok(Self::from_parts(Some(config_dir), save_every, config, history))
    }

    fn from_parts(
        config_dir: Option<PathBuf>,
        save_every: usize,
        config: ThresholdConfig,
        history: VecDeque<DecisionRecord>,
    ) -> Self {
        let mut analytics: HashMap<String, EmitterAnalytics> = HashMap::new();
        for record in &history {
            analytics
                .entry(record.emitter.clone())
                .or_insert_with(|| EmitterAnalytics::first_seen_at(record.timestamp))
                .record(&record.category, record.current_count, record.timestamp);
        }

        Self {
            config_dir,
            save_every: save_every.max(1),
            state: Mutex::new(ManagerState {
                config,
                analytics,
                history,
                unsaved: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Evaluate whether `emitter` in `category` deserves a subfolder
    pub fn should_create_subfolder(
        &self,
        category: &Category,
        emitter: &str,
        current_count: u32,
        emitter_info: Option<&EmitterInfo>,
    ) -> ThresholdDecision {
        self.should_create_subfolder_at(category, emitter, current_count, emitter_info, Utc::now())
    }

    /// Same as [`Self::should_create_subfolder`] with an explicit clock
    pub fn should_create_subfolder_at(
        &self,
        category: &Category,
        emitter: &str,
        current_count: u32,
        emitter_info: Option<&EmitterInfo>,
        now: DateTime<Utc>,
    ) -> ThresholdDecision {
        let extraction_confidence = emitter_info.map(|e| e.confidence);

        let (decision, due) = {
            let mut state = self.lock();
            let base = state.config.threshold_for(category);

            let prior = state
                .analytics
                .get(emitter)
                .cloned()
                .unwrap_or_else(|| EmitterAnalytics::first_seen_at(now));

            let adjustments: Vec<Adjustment> =
                analytics::adjustments(category, &prior, extraction_confidence, now);
            let adjusted = analytics::apply(base, &adjustments);
            let decision = ThresholdDecision {
                should_create: current_count >= adjusted,
                base_threshold: base,
                adjusted_threshold: adjusted,
                confidence: analytics::decision_confidence(&prior, extraction_confidence),
                reasons: adjustments.into_iter().map(|a| a.reason).collect(),
            };

            state
                .analytics
                .entry(emitter.to_string())
                .or_insert(prior)
                .record(category, current_count, now);

            state.history.push_back(DecisionRecord {
                category: category.clone(),
                emitter: emitter.to_string(),
                current_count,
                base_threshold: base,
                adjusted_threshold: adjusted,
                should_create: decision.should_create,
                confidence: decision.confidence,
                timestamp: now,
            });
            while state.history.len() > MAX_HISTORY {
                state.history.pop_front();
            }

            state.unsaved += 1;
            let due = self.config_dir.is_some() && state.unsaved >= self.save_every;
            (decision, due)
        };

        debug!(
            category = %category,
            emitter,
            current_count,
            base = decision.base_threshold,
            adjusted = decision.adjusted_threshold,
            should_create = decision.should_create,
            confidence = decision.confidence,
            reasons = ?decision.reasons,
            "Threshold decision"
        );

        if due {
            if let Err(e) = self.save() {
                warn!(error = %e, "Threshold auto-save failed");
            }
        }

        decision
    }

    /// Configured (unadjusted) threshold for a category
    pub fn threshold_for(&self, category: &Category) -> u32 {
        self.lock().config.threshold_for(category)
    }

    /// Manual override; the value must be at least 1
    pub fn set_threshold(&self, category: &Category, value: u32) -> Result<(), ThresholdError> {
        if value == 0 {
            return Err(ThresholdError::Invalid(format!(
                "threshold for '{}' must be at least 1",
                category
            )));
        }
        let previous = {
            let mut state = self.lock();
            let previous = state.config.threshold_for(category);
            state.config.set(category, value);
            previous
        };
        info!(category = %category, previous, value, "Threshold updated");
        Ok(())
    }

    /// Heuristic threshold changes from the decision history
    ///
    /// A category recommending a subfolder in more than half of its
    /// decisions is folding too eagerly (+1). A category that almost never
    /// recommends one although counts sit close to the threshold is too
    /// strict (-1, never below 1).
    pub fn suggest_thresholds(&self) -> Vec<ThresholdSuggestion> {
        let state = self.lock();

        let mut per_category: BTreeMap<Category, Vec<&DecisionRecord>> = BTreeMap::new();
        for record in &state.history {
            per_category.entry(record.category.clone()).or_default().push(record);
        }

        let mut suggestions = Vec::new();
        for (category, records) in per_category {
            if records.len() < MIN_SUGGESTION_SAMPLES {
                continue;
            }
            let current = state.config.threshold_for(&category);
            let created = records.iter().filter(|r| r.should_create).count();
            let rate = created as f64 / records.len() as f64;
            let mean_count =
                records.iter().map(|r| r.current_count as f64).sum::<f64>() / records.len() as f64;

            if rate > 0.5 {
                suggestions.push(ThresholdSuggestion {
                    category,
                    current,
                    suggested: current + 1,
                    reason: format!("subfolder recommended in {:.0}% of decisions", rate * 100.0),
                });
            } else if rate < 0.1 && current > 1 && mean_count >= current as f64 * 0.75 {
                suggestions.push(ThresholdSuggestion {
                    category,
                    current,
                    suggested: current - 1,
                    reason: format!(
                        "subfolder rarely recommended although mean count is {:.1}",
                        mean_count
                    ),
                });
            }
        }
        suggestions
    }

    /// Apply [`Self::suggest_thresholds`] and return what was applied
    pub fn apply_suggestions(&self) -> Vec<ThresholdSuggestion> {
        let suggestions = self.suggest_thresholds();
        {
            let mut state = self.lock();
            for s in &suggestions {
                state.config.set(&s.category, s.suggested);
            }
        }
        for s in &suggestions {
            info!(
                category = %s.category,
                from = s.current,
                to = s.suggested,
                reason = %s.reason,
                "Threshold suggestion applied"
            );
        }
        suggestions
    }

    pub fn statistics(&self) -> ThresholdStatistics {
        let state = self.lock();
        let mut stats = ThresholdStatistics {
            total_decisions: state.history.len(),
            tracked_emitters: state.analytics.len(),
            ..Default::default()
        };

        let mut confidence_sum = 0.0;
        for record in &state.history {
            let entry = stats.by_category.entry(record.category.to_string()).or_default();
            entry.decisions += 1;
            if record.should_create {
                entry.created += 1;
                stats.subfolders_recommended += 1;
            }
            confidence_sum += record.confidence;
        }
        if stats.total_decisions > 0 {
            stats.creation_rate = stats.subfolders_recommended as f64 / stats.total_decisions as f64;
            stats.average_confidence = confidence_sum / stats.total_decisions as f64;
        }
        stats
    }

    /// Most recent decisions, newest last
    pub fn recent_decisions(&self, n: usize) -> Vec<DecisionRecord> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Persist configuration and history; no-op for in-memory managers
    pub fn save(&self) -> Result<(), ThresholdError> {
        let Some(dir) = &self.config_dir else {
            return Ok(());
        };

        let stats = self.statistics();
        let (config_json, history_json) = {
            let mut state = self.lock();
            state.config.performance_metrics.total_decisions = stats.total_decisions as u64;
            state.config.performance_metrics.subfolders_recommended =
                stats.subfolders_recommended as u64;
            state.config.performance_metrics.average_confidence = stats.average_confidence;
            state.config.last_updated = Utc::now();
            state.unsaved = 0;

            let config_json = serde_json::to_vec_pretty(&state.config)
                .map_err(|e| ThresholdError::Malformed(dir.join(CONFIG_FILE), e.to_string()))?;
            let history_json = serde_json::to_vec_pretty(&state.history)
                .map_err(|e| ThresholdError::Malformed(dir.join(HISTORY_FILE), e.to_string()))?;
            (config_json, history_json)
        };

        write_atomic(&dir.join(CONFIG_FILE), &config_json)?;
        write_atomic(&dir.join(HISTORY_FILE), &history_json)?;
        debug!(config_dir = %dir.display(), decisions = stats.total_decisions, "Thresholds saved");
        Ok(())
    }
}

impl Default for ThresholdManager {
    fn default() -> Self {
        Self::new()
    }
}

fn load_history(path: &Path) -> Result<VecDeque<DecisionRecord>, ThresholdError> {
    if !path.exists() {
        return Ok(VecDeque::new());
    }
    let content = std::fs::read_to_string(path)?;
    let mut history: VecDeque<DecisionRecord> = serde_json::from_str(&content)
        .map_err(|e| ThresholdError::Malformed(path.to_path_buf(), e.to_string()))?;
    while history.len() > MAX_HISTORY {
        history.pop_front();
    }
    Ok(history)
}
