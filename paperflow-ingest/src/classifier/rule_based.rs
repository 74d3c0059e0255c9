//! Rule-Based Classifier
//!
//! Scores a document against every category's pattern set using the filename
//! and the OCR text, then picks the best category.
//!
//! # Scoring
//! Each distinct rule that fires adds `base_weight × kind multiplier`
//! (keyword 1.0, prefix/suffix 2.0, pattern 2.5, known entity 4.0). The
//! winner's confidence is `min(1, score / 10)`; below 0.3 the document is
//! filed as `non_classes`.
//!
//! # Tie-break
//! 1. Highest raw score
//! 2. Most specific match kind present (entity > pattern > affix > keyword)
//! 3. Earlier category in the rule table
//!
//! Pure and deterministic: no I/O, no clock, no randomness.

use super::rules::{CategoryRules, MatchKind, RuleSet};
use crate::text::normalize_for_match;
use crate::types::{Category, ClassificationResult, ClassificationSource, Entity, EntityKind};
use regex::Regex;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Score that maps to confidence 1.0
pub const SCORE_SATURATION: f64 = 10.0;

/// Below this confidence the category is forced to `non_classes`
pub const CONFIDENCE_FLOOR: f64 = 0.3;

const SCORE_EPSILON: f64 = 1e-9;

/// Rule compilation error
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid pattern '{pattern}' for category {category}: {source}")]
    InvalidPattern {
        category: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One compiled rule
struct CompiledRule {
    kind: MatchKind,
    label: String,
    matcher: Matcher,
}

enum Matcher {
    /// Word-bounded regex over the haystack
    Text(Regex),
    Prefix(String),
    Suffix(String),
    /// Word-bounded regex over haystack and entity values
    Entity(Regex),
}

struct CompiledCategory {
    category: Category,
    base_weight: f64,
    rules: Vec<CompiledRule>,
}

/// Per-category score sheet
#[derive(Debug, Clone)]
pub struct CategoryScore {
    pub category: Category,
    pub score: f64,
    pub strongest: Option<MatchKind>,
    pub matched_rules: Vec<String>,
}

/// Deterministic keyword/pattern classifier
pub struct RuleBasedClassifier {
    categories: Vec<CompiledCategory>,
}

impl RuleBasedClassifier {
    /// Classifier over the built-in French rule table
    pub fn new() -> Self {
        // Built-in patterns always compile (test_default_rules_compile)
        Self::from_rules(&RuleSet::default()).unwrap_or(Self {
            categories: Vec::new(),
        })
    }

    /// Compile a rule table
    pub fn from_rules(rules: &RuleSet) -> Result<Self, RuleError> {
        let categories = rules
            .categories
            .iter()
            .filter(|r| !r.category.is_unclassified())
            .map(compile_category)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { categories })
    }

    /// Add (or replace) a category's rules, e.g. from category discovery
    pub fn register_category(&mut self, rules: &CategoryRules) -> Result<(), RuleError> {
        let compiled = compile_category(rules)?;
        match self
            .categories
            .iter_mut()
            .find(|c| c.category == compiled.category)
        {
            Some(existing) => *existing = compiled,
            None => self.categories.push(compiled),
        }
        Ok(())
    }

    /// Categories known to this classifier, in table order
    pub fn categories(&self) -> Vec<Category> {
        self.categories.iter().map(|c| c.category.clone()).collect()
    }

    /// Classify a document
    pub fn classify(&self, filename: &str, ocr_text: &str, entities: &[Entity]) -> ClassificationResult {
        let scores = self.score_all(filename, ocr_text, entities);

        let mut best: Option<&CategoryScore> = None;
        for candidate in scores.iter().filter(|s| s.score > 0.0) {
            best = match best {
                None => Some(candidate),
                Some(current) if beats(candidate, current) => Some(candidate),
                keep => keep,
            };
        }

        let Some(winner) = best else {
            debug!(filename, "No rule matched, document unclassified");
            return ClassificationResult::unclassified();
        };

        let confidence = (winner.score / SCORE_SATURATION).min(1.0);

        if confidence < CONFIDENCE_FLOOR {
            debug!(
                filename,
                candidate = %winner.category,
                score = winner.score,
                confidence,
                "Best category below confidence floor"
            );
            let mut matched_rules = vec![format!("below_floor:{}", winner.category)];
            matched_rules.extend(winner.matched_rules.iter().cloned());
            return ClassificationResult {
                category: Category::NonClasses,
                confidence,
                source: ClassificationSource::RulesOnly,
                matched_rules,
            };
        }

        debug!(
            filename,
            category = %winner.category,
            score = winner.score,
            confidence,
            rules = winner.matched_rules.len(),
            "Rule classification complete"
        );

        ClassificationResult {
            category: winner.category.clone(),
            confidence,
            source: ClassificationSource::RulesOnly,
            matched_rules: winner.matched_rules.clone(),
        }
    }

    /// Score every category (table order)
    pub fn score_all(&self, filename: &str, ocr_text: &str, entities: &[Entity]) -> Vec<CategoryScore> {
        let stem = filename_stem(filename);
        let haystack = format!("{} \n{}", stem.replace(['_', '-', '.'], " "), normalize_for_match(ocr_text));
        let entity_values: Vec<String> = entities
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EntityKind::Organization | EntityKind::Emitter | EntityKind::Other
                )
            })
            .map(|e| normalize_for_match(&e.value))
            .collect();

        self.categories
            .iter()
            .map(|cat| {
                let mut score = 0.0;
                let mut strongest = None;
                let mut matched_rules = Vec::new();

                for rule in &cat.rules {
                    let hit = match &rule.matcher {
                        Matcher::Text(re) => re.is_match(&haystack),
                        Matcher::Prefix(p) => stem.starts_with(p.as_str()),
                        Matcher::Suffix(s) => stem.ends_with(s.as_str()),
                        Matcher::Entity(re) => {
                            re.is_match(&haystack) || entity_values.iter().any(|v| re.is_match(v))
                        }
                    };
                    if hit {
                        score += cat.base_weight * rule.kind.multiplier();
                        strongest = strongest.max(Some(rule.kind));
                        matched_rules.push(rule.label.clone());
                    }
                }

                CategoryScore {
                    category: cat.category.clone(),
                    score,
                    strongest,
                    matched_rules,
                }
            })
            .collect()
    }
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// True if `candidate` strictly beats `current` (ties keep table order)
fn beats(candidate: &CategoryScore, current: &CategoryScore) -> bool {
    if candidate.score > current.score + SCORE_EPSILON {
        return true;
    }
    if (candidate.score - current.score).abs() <= SCORE_EPSILON {
        return candidate.strongest > current.strongest;
    }
    false
}

/// Lowercased, accent-folded file name without extension
fn filename_stem(filename: &str) -> String {
    let name = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    normalize_for_match(name)
}

fn word_regex(category: &Category, term: &str) -> Result<Regex, RuleError> {
    let pattern = format!(r"\b{}\b", regex::escape(&normalize_for_match(term)));
    Regex::new(&pattern).map_err(|source| RuleError::InvalidPattern {
        category: category.to_string(),
        pattern,
        source,
    })
}

fn compile_category(rules: &CategoryRules) -> Result<CompiledCategory, RuleError> {
    let category = &rules.category;
    let mut compiled = Vec::new();

    for keyword in &rules.keywords {
        compiled.push(CompiledRule {
            kind: MatchKind::Keyword,
            label: format!("keyword:{}", keyword),
            matcher: Matcher::Text(word_regex(category, keyword)?),
        });
    }

    for pattern in &rules.patterns {
        let re = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            category: category.to_string(),
            pattern: pattern.clone(),
            source,
        })?;
        compiled.push(CompiledRule {
            kind: MatchKind::Pattern,
            label: format!("pattern:{}", pattern),
            matcher: Matcher::Text(re),
        });
    }

    for prefix in &rules.prefixes {
        compiled.push(CompiledRule {
            kind: MatchKind::Affix,
            label: format!("prefix:{}", prefix),
            matcher: Matcher::Prefix(normalize_for_match(prefix)),
        });
    }

    for suffix in &rules.suffixes {
        compiled.push(CompiledRule {
            kind: MatchKind::Affix,
            label: format!("suffix:{}", suffix),
            matcher: Matcher::Suffix(normalize_for_match(suffix)),
        });
    }

    for entity in &rules.entities {
        compiled.push(CompiledRule {
            kind: MatchKind::Entity,
            label: format!("entity:{}", entity),
            matcher: Matcher::Entity(word_regex(category, entity)?),
        });
    }

    Ok(CompiledCategory {
        category: category.clone(),
        base_weight: rules.base_weight,
        rules: compiled,
    })
}
