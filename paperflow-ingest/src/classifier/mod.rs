//! Rule-based document classification
//!
//! - `rules`: data-driven pattern tables per category
//! - `rule_based`: deterministic scorer over those tables
//! - `discovery`: optional emerging-category detection on unclassified documents

pub mod discovery;
pub mod rule_based;
pub mod rules;

pub use discovery::{CategoryDiscovery, DiscoveryConfig, EmergingCategory};
pub use rule_based::{CategoryScore, RuleBasedClassifier, RuleError, CONFIDENCE_FLOOR};
pub use rules::{CategoryRules, MatchKind, RuleSet};
