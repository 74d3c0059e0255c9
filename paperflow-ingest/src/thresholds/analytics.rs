//! Per-emitter analytics and threshold adjustment factors

use crate::types::Category;
use chrono::{DateTime, Utc};
use paperflow_common::time::days_between;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Categories whose documents are distinctive enough to fold early
pub const HIGH_SPECIFICITY: &[Category] = &[
    Category::Rib,
    Category::CartesTransport,
    Category::Impots,
    Category::RelevesBancaires,
];

/// Categories that are catch-alls and fold late
pub const LOW_SPECIFICITY: &[Category] = &[
    Category::DocumentsPersonnels,
    Category::Courriers,
    Category::NonClasses,
];

/// What is known about one emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterAnalytics {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Highest count observed per category
    pub max_counts: HashMap<Category, u32>,
}

impl EmitterAnalytics {
    /// A never-seen emitter, first seen at `now`
    pub fn first_seen_at(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            max_counts: HashMap::new(),
        }
    }

    /// Documents seen for this emitter across all categories
    pub fn total_documents(&self) -> u32 {
        self.max_counts.values().sum()
    }

    /// Fold one observation in
    pub fn record(&mut self, category: &Category, current_count: u32, now: DateTime<Utc>) {
        if now < self.first_seen {
            self.first_seen = now;
        }
        if now > self.last_seen {
            self.last_seen = now;
        }
        let max = self.max_counts.entry(category.clone()).or_insert(0);
        *max = (*max).max(current_count);
    }

    /// Average documents per day since first seen (at least one day)
    pub fn daily_rate(&self, now: DateTime<Utc>) -> f64 {
        let days = days_between(self.first_seen, now).max(1.0);
        self.total_documents() as f64 / days
    }
}

/// One additive contribution to the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub delta: f64,
    pub reason: String,
}

impl Adjustment {
    fn new(delta: f64, reason: impl Into<String>) -> Self {
        Self {
            delta,
            reason: reason.into(),
        }
    }
}

/// Adjustments for a decision, computed from the emitter's prior state
///
/// `extraction_confidence` is `None` when no emitter extraction
/// confidence is known, in which case that factor is skipped.
pub fn adjustments(
    category: &Category,
    prior: &EmitterAnalytics,
    extraction_confidence: Option<f64>,
    now: DateTime<Utc>,
) -> Vec<Adjustment> {
    let mut out = Vec::new();

    let total = prior.total_documents();
    if total > 10 {
        out.push(Adjustment::new(-1.0, format!("frequent emitter ({} documents)", total)));
    } else if total > 5 {
        out.push(Adjustment::new(-0.5, format!("regular emitter ({} documents)", total)));
    }

    if HIGH_SPECIFICITY.contains(category) {
        out.push(Adjustment::new(-1.0, format!("specific category {}", category)));
    } else if LOW_SPECIFICITY.contains(category) {
        out.push(Adjustment::new(1.0, format!("generic category {}", category)));
    }

    match extraction_confidence {
        Some(c) if c > 0.9 => {
            out.push(Adjustment::new(-0.5, format!("high extraction confidence {:.2}", c)))
        }
        Some(c) if c < 0.7 => {
            out.push(Adjustment::new(0.5, format!("low extraction confidence {:.2}", c)))
        }
        _ => {}
    }

    if days_between(prior.first_seen, now) < 7.0 {
        out.push(Adjustment::new(0.5, "emitter first seen less than 7 days ago"));
    }
    let idle = days_between(prior.last_seen, now);
    if idle > 30.0 {
        out.push(Adjustment::new(1.0, format!("emitter inactive for {:.0} days", idle)));
    }
    let rate = prior.daily_rate(now);
    if rate > 0.5 {
        out.push(Adjustment::new(-0.5, format!("active emitter ({:.2} documents/day)", rate)));
    }

    out
}

/// `max(1, base + round(sum))`, rounding half away from zero
pub fn apply(base: u32, adjustments: &[Adjustment]) -> u32 {
    let total: f64 = adjustments.iter().map(|a| a.delta).sum();
    let adjusted = base as i64 + total.round() as i64;
    adjusted.max(1) as u32
}

/// Decision confidence from the same inputs
pub fn decision_confidence(prior: &EmitterAnalytics, extraction_confidence: Option<f64>) -> f64 {
    let mut confidence = 0.7;
    match extraction_confidence {
        Some(c) if c > 0.9 => confidence += 0.1,
        Some(c) if c < 0.7 => confidence -= 0.1,
        _ => {}
    }
    let total = prior.total_documents();
    if total > 10 {
        confidence += 0.1;
    } else if total > 5 {
        confidence += 0.05;
    }
    f64::clamp(confidence, 0.0, 1.0)
}
