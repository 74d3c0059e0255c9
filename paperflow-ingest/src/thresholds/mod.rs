//! Adaptive subfolder thresholds
//!
//! Decides per (category, emitter) whether documents deserve their own
//! subfolder. The base threshold comes from [`config::ThresholdConfig`]; it
//! is adjusted by emitter frequency, category specificity, extraction
//! confidence and temporal activity ([`analytics`]).

pub mod analytics;
pub mod config;
pub mod manager;

pub use config::{ThresholdConfig, DEFAULT_KEY};
pub use manager::{
    CategoryDecisionStats, DecisionRecord, ThresholdDecision, ThresholdManager,
    ThresholdStatistics, ThresholdSuggestion,
};

use std::path::PathBuf;
use thiserror::Error;

/// Threshold persistence and configuration errors
#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed threshold file {0}: {1}")]
    Malformed(PathBuf, String),

    #[error("Invalid threshold: {0}")]
    Invalid(String),

    #[error(transparent)]
    Common(#[from] paperflow_common::Error),
}
