//! Multi-hop integration tests.
//!
//! Decomposes compound queries and executes the plans against in-process
//! layers, checking hop ordering, failure handling and the combined context.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use strata::config::{ClassifierConfig, DecomposerConfig, ExecutorConfig};
use strata::layers::StaticLayer;
use strata::models::{ExecutionStrategy, PlanSource};
use strata::services::{DecompositionBackend, FusionOptions};
use strata::{Classifier, Decomposer, LayerId, MultiHopExecutor, Router, SubQuery};

const COMPOUND: &str =
    "Show me the complete login flow and registration process and password reset workflow";

const AUTH_DOCS: &[&str] = &[
    "The login flow starts at the auth page",
    "The registration process sends a confirmation email",
    "The password reset workflow issues a one-time token",
];

// ============================================================================
// Test Helpers
// ============================================================================

/// Backend returning a fixed plan regardless of the query.
struct FixedPlan(Vec<SubQuery>);

impl DecompositionBackend for FixedPlan {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn source(&self) -> PlanSource {
        PlanSource::Llm
    }

    fn plan(&self, _query: &str, _max_sub_queries: usize) -> strata::Result<Vec<SubQuery>> {
        Ok(self.0.clone())
    }
}

fn auth_router(latency: Option<Duration>) -> Arc<Router> {
    let mut layer = StaticLayer::with_texts(LayerId::Vector, AUTH_DOCS);
    if let Some(latency) = latency {
        layer = layer.with_latency(latency);
    }
    let classifier = Arc::new(Classifier::keyword_only(ClassifierConfig::default()));
    Arc::new(Router::builder(classifier).with_layer(Arc::new(layer)).build())
}

fn heuristic() -> Arc<Decomposer> {
    Arc::new(Decomposer::heuristic_only(DecomposerConfig::default()))
}

// ============================================================================
// Decomposition
// ============================================================================

#[tokio::test]
async fn test_simple_query_is_not_decomposed() {
    let result = heuristic().decompose("What is X?").await;
    assert!(!result.is_complex);
    assert!(result.sub_queries.is_empty());
    assert_eq!(result.source, PlanSource::None);
}

#[tokio::test]
async fn test_compound_query_splits_into_chain() {
    let result = heuristic().decompose(COMPOUND).await;
    assert!(result.is_complex);
    assert_eq!(result.source, PlanSource::Heuristic);
    assert_eq!(result.strategy, ExecutionStrategy::Sequential);

    let ids: Vec<&str> = result.sub_queries.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2", "q3"]);
    assert!(result.sub_queries[0].dependencies.is_empty());
    assert_eq!(result.sub_queries[1].dependencies, vec!["q1".to_string()]);
    assert_eq!(result.sub_queries[2].dependencies, vec!["q2".to_string()]);
}

#[tokio::test]
async fn test_backend_plan_shapes_strategy() {
    let independent = FixedPlan(vec![
        SubQuery::new("a", "login flow"),
        SubQuery::new("b", "registration process"),
    ]);
    let decomposer = Decomposer::with_backend(Arc::new(independent), DecomposerConfig::default());
    let result = decomposer.decompose(COMPOUND).await;
    assert_eq!(result.source, PlanSource::Llm);
    assert_eq!(result.strategy, ExecutionStrategy::Parallel);

    let fan_in = FixedPlan(vec![
        SubQuery::new("a", "login flow"),
        SubQuery::new("b", "registration process"),
        SubQuery::new("c", "password reset workflow")
            .depends_on("a")
            .depends_on("b"),
    ]);
    let decomposer = Decomposer::with_backend(Arc::new(fan_in), DecomposerConfig::default());
    assert_eq!(
        decomposer.decompose(COMPOUND).await.strategy,
        ExecutionStrategy::Hybrid
    );
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_sequential_run_combines_every_hop() {
    let executor = MultiHopExecutor::new(auth_router(None), heuristic())
        .with_fusion_options(FusionOptions::default().with_min_score(0.1));

    let result = executor.run(COMPOUND).await;

    assert_eq!(result.stats.hop_count, 3);
    let hop_ids: Vec<&str> = result.hops.iter().map(|h| h.sub_query_id.as_str()).collect();
    assert_eq!(hop_ids, vec!["q1", "q2", "q3"]);
    assert!(result.hops.iter().all(|h| h.is_success()));
    assert!(result.hops.iter().all(|h| !h.context.is_empty()));

    // Every hop sees the same layer, so the combined context collapses repeats
    assert_eq!(result.context.items.len(), AUTH_DOCS.len());
    assert!(result.stats.dedup_rate > 0.0);
    assert_eq!(result.stats.estimated_tokens, result.context.stats.estimated_tokens);
}

#[tokio::test]
async fn test_combined_context_keeps_each_hop_best_item() {
    let executor = MultiHopExecutor::new(auth_router(None), heuristic());

    let result = executor.run(COMPOUND).await;

    assert_eq!(result.stats.hop_count, 3);
    let combined: Vec<&str> = result
        .context
        .items
        .iter()
        .map(|i| i.item.content.as_str())
        .collect();
    for hop in &result.hops {
        let best = hop.context.first().expect("hop found its document");
        assert!(
            combined.contains(&best.item.content.as_str()),
            "{} lost from combined context",
            hop.sub_query_id
        );
    }
    assert_eq!(combined.len(), AUTH_DOCS.len());
}

#[tokio::test]
async fn test_hop_results_follow_plan_order_in_parallel() {
    let plan = FixedPlan(vec![
        SubQuery::new("z", "password reset workflow"),
        SubQuery::new("y", "registration process"),
        SubQuery::new("x", "login flow"),
    ]);
    let decomposer = Arc::new(Decomposer::with_backend(
        Arc::new(plan),
        DecomposerConfig::default(),
    ));
    let executor = MultiHopExecutor::new(auth_router(None), decomposer);

    let result = executor.run(COMPOUND).await;
    assert_eq!(result.decomposition.strategy, ExecutionStrategy::Parallel);
    let hop_ids: Vec<&str> = result.hops.iter().map(|h| h.sub_query_id.as_str()).collect();
    assert_eq!(hop_ids, vec!["z", "y", "x"]);
}

#[tokio::test]
async fn test_slow_hops_time_out_without_failing_run() {
    let executor = MultiHopExecutor::new(auth_router(Some(Duration::from_secs(2))), heuristic())
        .with_config(ExecutorConfig {
            hop_timeout_ms: 30,
            ..ExecutorConfig::default()
        });

    let result = executor.run(COMPOUND).await;
    assert_eq!(result.hops.len(), 3);
    for hop in &result.hops {
        assert_eq!(hop.error.as_deref(), Some("Timeout"));
        assert!(hop.context.is_empty());
        assert!(hop.relevance.abs() < f32::EPSILON);
    }
    assert!(result.context.items.is_empty());
}

#[tokio::test]
async fn test_simple_query_runs_single_hop() {
    let executor = MultiHopExecutor::new(auth_router(None), heuristic());
    let result = executor.run("Explain the login flow").await;

    assert!(!result.decomposition.is_complex);
    assert_eq!(result.hops.len(), 1);
    assert_eq!(result.hops[0].query, "Explain the login flow");
    assert!(result.hops[0].classification.is_some());
}
