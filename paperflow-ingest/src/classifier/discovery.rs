//! Emerging category discovery
//!
//! Optional extension of the rule-based classifier. Documents that end up in
//! `non_classes` are tokenized; a token that keeps appearing across distinct
//! unclassified documents is proposed as a new category, together with the
//! tokens it most often co-occurs with as keywords.
//!
//! Both thresholds are heuristics and are exposed in [`DiscoveryConfig`]
//! rather than fixed.
//!
//! Memory stays bounded: each document contributes at most
//! `max_tokens_per_document` tokens, and once more than `max_tracked_tokens`
//! are tracked the tokens seen in a single document are dropped.

use super::rules::{CategoryRules, RuleSet};
use crate::text::tokens;
use crate::types::{Category, ClassificationResult};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Words carrying no category signal
const STOPWORDS: &[&str] = &[
    "avec", "dans", "cette", "votre", "vous", "nous", "sont", "pour", "plus", "page", "date",
    "total", "numero", "monsieur", "madame", "leur", "elles", "etre", "avoir", "fait", "tout",
    "tous", "sans", "sous", "entre", "apres", "avant", "depuis",
];

/// Discovery tuning
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Distinct unclassified documents a token must appear in
    pub frequency_threshold: usize,
    /// Jaccard similarity at or above which a proposal duplicates a category
    pub similarity_threshold: f64,
    /// Shortest token considered
    pub min_token_len: usize,
    /// Co-occurring tokens kept as keywords of a proposal
    pub max_keywords: usize,
    /// Distinct tokens taken from one document, in order of appearance
    pub max_tokens_per_document: usize,
    /// Tracked tokens above which singletons are pruned
    pub max_tracked_tokens: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            frequency_threshold: 5,
            similarity_threshold: 0.7,
            min_token_len: 5,
            max_keywords: 5,
            max_tokens_per_document: 64,
            max_tracked_tokens: 5000,
        }
    }
}

/// Proposed category
#[derive(Debug, Clone, PartialEq)]
pub struct EmergingCategory {
    pub slug: String,
    /// Distinct unclassified documents containing the seed token
    pub support: usize,
    /// Seed token first, then strongest co-occurring tokens
    pub keywords: Vec<String>,
}

impl EmergingCategory {
    /// Rule entry for registering this proposal with the classifier
    pub fn to_rules(&self) -> CategoryRules {
        CategoryRules {
            keywords: self.keywords.clone(),
            prefixes: vec![self.slug.clone()],
            ..CategoryRules::new(Category::Custom(self.slug.clone()))
        }
    }
}

/// Tracks tokens of unclassified documents
pub struct CategoryDiscovery {
    config: DiscoveryConfig,
    token_support: HashMap<String, usize>,
    co_occurrence: HashMap<String, HashMap<String, usize>>,
    registered: HashSet<String>,
    observed: usize,
}

impl CategoryDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            token_support: HashMap::new(),
            co_occurrence: HashMap::new(),
            registered: HashSet::new(),
            observed: 0,
        }
    }

    /// Record a classified document; only `non_classes` results are kept
    pub fn observe(&mut self, filename: &str, text: &str, result: &ClassificationResult) {
        if !result.category.is_unclassified() {
            return;
        }

        let stop: HashSet<&str> = STOPWORDS.iter().copied().collect();
        let mut seen = HashSet::new();
        let doc_tokens: BTreeSet<String> = tokens(&format!("{} {}", filename, text), self.config.min_token_len)
            .into_iter()
            .filter(|t| !stop.contains(t.as_str()))
            .filter(|t| seen.insert(t.clone()))
            .take(self.config.max_tokens_per_document)
            .collect();

        for token in &doc_tokens {
            *self.token_support.entry(token.clone()).or_insert(0) += 1;
            let row = self.co_occurrence.entry(token.clone()).or_default();
            for other in doc_tokens.iter().filter(|o| *o != token) {
                *row.entry(other.clone()).or_insert(0) += 1;
            }
        }
        self.observed += 1;
        debug!(tokens = doc_tokens.len(), observed = self.observed, "Unclassified document observed");

        if self.token_support.len() > self.config.max_tracked_tokens {
            self.prune_singletons();
        }
    }

    /// Distinct tokens currently tracked
    pub fn tracked_tokens(&self) -> usize {
        self.token_support.len()
    }

    /// Drop tokens seen in only one document, everywhere they appear
    fn prune_singletons(&mut self) {
        let before = self.token_support.len();
        self.token_support.retain(|_, support| *support > 1);
        let live = &self.token_support;
        self.co_occurrence.retain(|token, _| live.contains_key(token));
        for row in self.co_occurrence.values_mut() {
            row.retain(|other, _| live.contains_key(other));
        }
        debug!(before, after = self.token_support.len(), "Singleton tokens pruned");
    }

    /// Unclassified documents observed so far
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Proposals not overlapping the known rule table, strongest first
    pub fn proposals(&self, known: &RuleSet) -> Vec<EmergingCategory> {
        let known_keywords: Vec<HashSet<String>> = known
            .categories
            .iter()
            .map(|r| {
                r.keywords
                    .iter()
                    .flat_map(|k| tokens(k, self.config.min_token_len))
                    .collect()
            })
            .collect();
        let known_slugs: HashSet<&str> = known.categories().map(|c| c.as_str()).collect();

        let mut proposals: Vec<EmergingCategory> = self
            .token_support
            .iter()
            .filter(|(_, &support)| support >= self.config.frequency_threshold)
            .filter(|(token, _)| {
                !self.registered.contains(*token) && !known_slugs.contains(token.as_str())
            })
            .filter(|(token, _)| !known_keywords.iter().any(|set| set.contains(*token)))
            .map(|(token, &support)| EmergingCategory {
                slug: token.clone(),
                support,
                keywords: self.keywords_for(token),
            })
            .filter(|p| {
                let set: HashSet<String> = p.keywords.iter().cloned().collect();
                known_keywords
                    .iter()
                    .all(|known| jaccard(&set, known) < self.config.similarity_threshold)
            })
            .collect();

        proposals.sort_by(|a, b| b.support.cmp(&a.support).then_with(|| a.slug.cmp(&b.slug)));
        proposals
    }

    /// Mark a proposal as registered so it is not proposed again
    pub fn mark_registered(&mut self, proposal: &EmergingCategory) {
        info!(
            slug = %proposal.slug,
            support = proposal.support,
            "Emerging category registered"
        );
        self.registered.insert(proposal.slug.clone());
    }

    fn keywords_for(&self, token: &str) -> Vec<String> {
        let min_co = (self.config.frequency_threshold / 2).max(1);
        let mut co: Vec<(&String, &usize)> = self
            .co_occurrence
            .get(token)
            .map(|row| row.iter().filter(|(_, &n)| n >= min_co).collect())
            .unwrap_or_default();
        co.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut keywords = vec![token.to_string()];
        keywords.extend(
            co.into_iter()
                .take(self.config.max_keywords.saturating_sub(1))
                .map(|(t, _)| t.clone()),
        );
        keywords
    }
}

impl Default for CategoryDiscovery {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

/// Jaccard similarity of two token sets (0 when both are empty)
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
