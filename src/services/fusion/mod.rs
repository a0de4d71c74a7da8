//! Result fusion.
//!
//! Turns heterogeneous layer output into a ranked, deduplicated,
//! token-bounded context.
//!
//! # Pipeline
//!
//! ```text
//! normalize ─► score ─► dedup ─► [diversity] ─► sort ─► min_score ─► token budget
//! ```
//!
//! The token budget is greedy: items are taken in score order until the first
//! one that would push the estimate past the budget.

mod dedup;
mod diversity;
mod normalize;
mod scorer;

pub use dedup::{ContentHasher, deduplicate};
pub use diversity::apply_diversity;
pub use normalize::normalize_item;
pub use scorer::{RelevanceScorer, TermOverlapScorer, query_terms};

use crate::elapsed_ms;
use crate::models::{FusedResult, FusionStats, HopResult, RoutingResult, ScoredItem};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Fusion tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionOptions {
    /// Items scoring below this are dropped.
    pub min_score: f32,
    /// Maximum estimated tokens in the output.
    pub token_budget: usize,
    /// Cosine similarity at or above which two items are duplicates.
    pub similarity_threshold: f32,
    /// Enables the layer-diversity stage.
    pub diversity_enabled: bool,
    /// Strength of the diversity penalty.
    pub diversity_penalty: f32,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            token_budget: 10_000,
            similarity_threshold: 0.9,
            diversity_enabled: false,
            diversity_penalty: 0.1,
        }
    }
}

impl FusionOptions {
    /// Sets the minimum score.
    #[must_use]
    pub const fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Sets the token budget.
    #[must_use]
    pub const fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = token_budget;
        self
    }

    /// Sets the near-duplicate threshold.
    #[must_use]
    pub const fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Enables the diversity stage with the given penalty.
    #[must_use]
    pub const fn with_diversity(mut self, penalty: f32) -> Self {
        self.diversity_enabled = true;
        self.diversity_penalty = penalty;
        self
    }
}

/// Merges routing or hop output into a [`FusedResult`].
#[derive(Clone)]
pub struct ResultFusion {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Default for ResultFusion {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultFusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFusion").finish_non_exhaustive()
    }
}

impl ResultFusion {
    /// Creates a fusion pass with the term-overlap scorer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scorer: Arc::new(TermOverlapScorer::new()),
        }
    }

    /// Replaces the relevance scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Fuses the items of every successful layer in `routing`.
    #[instrument(skip(self, routing, options), fields(layers = routing.results.len()))]
    pub fn merge(&self, routing: &RoutingResult, options: &FusionOptions) -> FusedResult {
        let start = Instant::now();
        let scored = routing
            .successful()
            .flat_map(|result| {
                result
                    .items()
                    .iter()
                    .filter_map(move |raw| normalize_item(raw, result.layer, result.weight))
            })
            .map(|item| {
                let score = self.scorer.score(&routing.query, &item);
                ScoredItem::new(item, score)
            })
            .collect();
        Self::fuse(start, scored, options)
    }

    /// Fuses the contexts of several hops against `query`.
    ///
    /// Each item keeps the better of its hop score and its score against
    /// `query`, so an item relevant to its own sub-query is not lost to the
    /// broader term set of the compound query.
    #[instrument(skip(self, query, hops, options), fields(hops = hops.len()))]
    pub fn merge_hops(&self, query: &str, hops: &[HopResult], options: &FusionOptions) -> FusedResult {
        let start = Instant::now();
        let scored = hops
            .iter()
            .flat_map(|hop| hop.context.iter())
            .filter(|scored| !scored.item.content.trim().is_empty())
            .map(|scored| {
                let score = self.scorer.score(query, &scored.item).max(scored.score);
                ScoredItem::new(scored.item.clone(), score)
            })
            .collect();
        Self::fuse(start, scored, options)
    }

    fn fuse(start: Instant, scored: Vec<ScoredItem>, options: &FusionOptions) -> FusedResult {
        let total_items = scored.len();

        let mut ranked = deduplicate(scored, options.similarity_threshold);
        let after_dedup = ranked.len();

        if options.diversity_enabled {
            ranked = apply_diversity(ranked, options.diversity_penalty);
        }
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut estimated_tokens = 0usize;
        let mut selected = Vec::new();
        for item in ranked.into_iter().filter(|i| i.score >= options.min_score) {
            let tokens = item.item.estimated_tokens();
            if estimated_tokens + tokens > options.token_budget {
                break;
            }
            estimated_tokens += tokens;
            selected.push(item);
        }

        let stats = FusionStats {
            total_items,
            after_dedup,
            final_count: selected.len(),
            estimated_tokens,
            fusion_time_ms: elapsed_ms(start),
        };

        metrics::counter!("strata_fusion_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        let fused_items = stats.final_count as f64;
        metrics::histogram!("strata_fusion_items").record(fused_items);
        tracing::debug!(
            total = stats.total_items,
            after_dedup = stats.after_dedup,
            final_count = stats.final_count,
            tokens = stats.estimated_tokens,
            "Fused results"
        );

        FusedResult {
            items: selected,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClassificationResult, DetectionSource, LayerError, LayerId, LayerItem, LayerResult,
        MemoryItem, QueryType, RoutingStats,
    };
    use serde_json::json;

    fn routing(query: &str, results: Vec<LayerResult>) -> RoutingResult {
        RoutingResult {
            query: query.to_string(),
            classification: ClassificationResult::from_policy(
                query,
                QueryType::General,
                0.9,
                "",
                DetectionSource::Keyword,
            ),
            results,
            stats: RoutingStats::default(),
        }
    }

    fn layer(layer: LayerId, weight: f32, items: Vec<LayerItem>) -> LayerResult {
        LayerResult {
            layer,
            outcome: Ok(items),
            weight,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_merge_ranks_and_filters() {
        let result = routing(
            "auth token",
            vec![
                layer(
                    LayerId::Vector,
                    0.8,
                    vec!["auth token rotation".into(), "unrelated".into()],
                ),
                layer(LayerId::Graph, 0.4, vec![json!({"message": "auth module"}).into()]),
            ],
        );
        let fused = ResultFusion::new().merge(&result, &FusionOptions::default());

        assert_eq!(fused.stats.total_items, 3);
        assert_eq!(fused.items[0].item.content, "auth token rotation");
        assert!(fused.items.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(fused.items.iter().all(|i| i.score >= 0.3));
        assert!(!fused.items.iter().any(|i| i.item.content == "unrelated"));
    }

    #[test]
    fn test_failed_layers_contribute_nothing() {
        let result = routing(
            "auth",
            vec![
                layer(LayerId::Vector, 1.0, vec!["auth".into()]),
                LayerResult {
                    layer: LayerId::Graph,
                    outcome: Err(LayerError::Timeout),
                    weight: 1.0,
                    elapsed_ms: 5,
                },
            ],
        );
        let fused = ResultFusion::new().merge(&result, &FusionOptions::default());
        assert_eq!(fused.stats.total_items, 1);
    }

    #[test]
    fn test_identical_content_collapses_to_best() {
        let result = routing(
            "cache policy",
            vec![
                layer(LayerId::Session, 0.2, vec!["Cache policy is LRU".into()]),
                layer(LayerId::Vector, 1.0, vec!["cache  policy is lru".into()]),
            ],
        );
        let fused = ResultFusion::new().merge(&result, &FusionOptions::default());
        assert_eq!(fused.stats.after_dedup, 1);
        assert_eq!(fused.items[0].item.layer, LayerId::Vector);
    }

    #[test]
    fn test_token_budget_stops_at_first_overflow() {
        let long = "auth ".repeat(40);
        let result = routing(
            "auth",
            vec![layer(
                LayerId::Vector,
                1.0,
                vec!["auth short".into(), long.into(), "auth tiny".into()],
            )],
        );
        let options = FusionOptions::default().with_token_budget(10);
        let fused = ResultFusion::new().merge(&result, &options);
        assert!(fused.stats.estimated_tokens <= 10);
        assert!(fused.items.iter().all(|i| i.item.content.len() < 20));
    }

    #[test]
    fn test_zero_budget_yields_empty() {
        let result = routing("auth", vec![layer(LayerId::User, 1.0, vec!["auth".into()])]);
        let fused =
            ResultFusion::new().merge(&result, &FusionOptions::default().with_token_budget(0));
        assert!(fused.items.is_empty());
        assert_eq!(fused.stats.estimated_tokens, 0);
    }

    #[test]
    fn test_diversity_is_opt_in() {
        let items: Vec<LayerItem> = vec!["auth one".into(), "auth two".into()];
        let result = routing(
            "auth",
            vec![
                layer(LayerId::Vector, 1.0, items),
                layer(LayerId::Graph, 0.9, vec!["auth three".into()]),
            ],
        );
        let options = FusionOptions::default().with_min_score(0.0);
        let plain = ResultFusion::new().merge(&result, &options);
        assert_eq!(plain.items[2].item.layer, LayerId::Graph);

        let diverse = ResultFusion::new().merge(&result, &options.with_diversity(0.5));
        assert_eq!(diverse.items[1].item.layer, LayerId::Graph);
    }

    struct ConstantScorer(f32);

    impl RelevanceScorer for ConstantScorer {
        fn score(&self, _query: &str, _item: &MemoryItem) -> f32 {
            self.0
        }
    }

    #[test]
    fn test_custom_scorer() {
        let result = routing("x", vec![layer(LayerId::User, 1.0, vec!["anything".into()])]);
        let fusion = ResultFusion::new().with_scorer(Arc::new(ConstantScorer(0.1)));
        assert!(fusion.merge(&result, &FusionOptions::default()).items.is_empty());
    }

    #[test]
    fn test_merge_hops_rescores_against_query() {
        let hop = HopResult {
            sub_query_id: "q1".to_string(),
            query: "login".to_string(),
            classification: None,
            context: vec![ScoredItem::new(
                MemoryItem {
                    layer_weight: 1.0,
                    ..MemoryItem::new("login uses oauth", LayerId::Vector)
                },
                0.2,
            )],
            relevance: 0.2,
            elapsed_ms: 1,
            error: None,
        };
        let fused = ResultFusion::new().merge_hops("login oauth", &[hop], &FusionOptions::default());
        assert_eq!(fused.items.len(), 1);
        assert!((fused.items[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_merge_hops_keeps_hop_score_for_narrow_items() {
        let hop = HopResult {
            sub_query_id: "q2".to_string(),
            query: "registration process".to_string(),
            classification: None,
            context: vec![ScoredItem::new(
                MemoryItem {
                    layer_weight: 0.2,
                    ..MemoryItem::new("The registration process sends an email", LayerId::Vector)
                },
                0.76,
            )],
            relevance: 0.76,
            elapsed_ms: 1,
            error: None,
        };
        let compound = "Show me the complete login flow and registration process and password reset workflow";
        let fused = ResultFusion::new().merge_hops(compound, &[hop], &FusionOptions::default());

        assert_eq!(fused.items.len(), 1);
        assert!((fused.items[0].score - 0.76).abs() < 1e-6);
    }
}
