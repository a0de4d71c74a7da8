//! Relevance scoring.

use crate::models::MemoryItem;
use std::collections::BTreeSet;

/// Weight of query-term coverage in the default score.
const COVERAGE_WEIGHT: f32 = 0.7;

/// Weight of the source layer's routing weight in the default score.
const LAYER_WEIGHT: f32 = 0.3;

/// Coverage assumed when the query has no usable terms.
const NEUTRAL_COVERAGE: f32 = 0.5;

/// Minimum length of a query term.
const MIN_TERM_LEN: usize = 3;

/// Scores an item's relevance to a query.
///
/// Scores are expected in `[0, 1]` so that the minimum-score filter is
/// meaningful.
pub trait RelevanceScorer: Send + Sync {
    /// Returns the relevance of `item` to `query`.
    fn score(&self, query: &str, item: &MemoryItem) -> f32;
}

/// Default scorer: `0.7 * coverage + 0.3 * min(layer_weight, 1)`.
///
/// Coverage is the fraction of distinct query terms found in the item content.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapScorer;

impl TermOverlapScorer {
    /// Creates the scorer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fraction of query terms present in `content`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage(query: &str, content: &str) -> f32 {
        let terms = query_terms(query);
        if terms.is_empty() {
            return NEUTRAL_COVERAGE;
        }
        let lower = content.to_lowercase();
        let hits = terms.iter().filter(|t| lower.contains(t.as_str())).count();
        hits as f32 / terms.len() as f32
    }
}

impl RelevanceScorer for TermOverlapScorer {
    fn score(&self, query: &str, item: &MemoryItem) -> f32 {
        let coverage = Self::coverage(query, &item.content);
        let weight = item.layer_weight.clamp(0.0, 1.0);
        COVERAGE_WEIGHT.mul_add(coverage, LAYER_WEIGHT * weight)
    }
}

/// Distinct lowercase alphanumeric terms of at least three characters.
#[must_use]
pub fn query_terms(query: &str) -> BTreeSet<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}
