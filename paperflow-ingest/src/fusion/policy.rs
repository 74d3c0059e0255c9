//! Classification Fusion Policy
//!
//! Combines the rule-based result with the LLM collaborator's suggestion.
//!
//! # Fusion Strategy
//! 1. LLM absent or confidence 0 → rules result, `rules_only`
//! 2. LLM confident (> 0.8) and disagreeing → LLM category,
//!    confidence `min(0.95, mean of both)`, `mistral_override`
//! 3. LLM agreeing → rules category, confidence `min(0.98, rules × 1.2)`,
//!    `agreement_boost`
//! 4. Otherwise → rules result, `rules_priority`
//!
//! A low-confidence LLM never changes the category.

use crate::types::{ClassificationResult, ClassificationSource, LlmVerdict};
use paperflow_common::config::FusionSection;
use tracing::debug;

/// Fusion thresholds (defaults 0.8, 0.95, 0.98, 1.2)
#[derive(Debug, Clone, PartialEq)]
pub struct FusionThresholds {
    /// LLM confidence strictly above which a disagreeing LLM wins
    pub override_confidence: f64,
    /// Cap on the confidence of an overridden result
    pub override_cap: f64,
    /// Cap on the confidence of an agreeing result
    pub agreement_cap: f64,
    /// Multiplier applied to the rules confidence on agreement
    pub agreement_boost: f64,
}

impl Default for FusionThresholds {
    fn default() -> Self {
        Self {
            override_confidence: 0.8,
            override_cap: 0.95,
            agreement_cap: 0.98,
            agreement_boost: 1.2,
        }
    }
}

impl From<&FusionSection> for FusionThresholds {
    fn from(section: &FusionSection) -> Self {
        Self {
            override_confidence: section.override_confidence,
            override_cap: section.override_cap,
            agreement_cap: section.agreement_cap,
            agreement_boost: section.agreement_boost,
        }
    }
}

/// Fixed-policy fuser of rule and LLM classifications
#[derive(Debug, Clone, Default)]
pub struct FusionPolicy {
    thresholds: FusionThresholds,
}

impl FusionPolicy {
    /// Policy with the default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: FusionThresholds) -> Self {
        Self { thresholds }
    }

    /// Fuse a rules result with an optional LLM verdict
    pub fn fuse(&self, rules: &ClassificationResult, llm: Option<&LlmVerdict>) -> ClassificationResult {
        let t = &self.thresholds;

        let llm = match llm {
            Some(v) if v.confidence > 0.0 => v,
            _ => {
                debug!(category = %rules.category, "No LLM verdict, keeping rules result");
                return ClassificationResult {
                    source: ClassificationSource::RulesOnly,
                    ..rules.clone()
                };
            }
        };

        if llm.category != rules.category && llm.confidence > t.override_confidence {
            let confidence = ((rules.confidence + llm.confidence) / 2.0).min(t.override_cap);
            debug!(
                rules_category = %rules.category,
                llm_category = %llm.category,
                llm_confidence = llm.confidence,
                confidence,
                "LLM overrides rules"
            );
            return ClassificationResult {
                category: llm.category.clone(),
                confidence,
                source: ClassificationSource::MistralOverride,
                matched_rules: rules.matched_rules.clone(),
            };
        }

        if llm.category == rules.category {
            let confidence = (rules.confidence * t.agreement_boost).min(t.agreement_cap);
            debug!(category = %rules.category, confidence, "LLM agrees with rules");
            return ClassificationResult {
                confidence,
                source: ClassificationSource::AgreementBoost,
                ..rules.clone()
            };
        }

        debug!(
            rules_category = %rules.category,
            llm_category = %llm.category,
            llm_confidence = llm.confidence,
            "LLM not confident enough, rules take priority"
        );
        ClassificationResult {
            source: ClassificationSource::RulesPriority,
            ..rules.clone()
        }
    }
}
