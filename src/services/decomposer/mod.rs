//! Query decomposition.
//!
//! A query is complex when at least `complexity_threshold` independent
//! signals fire. Complex queries are planned by the model backend when one is
//! configured; on timeout, error, or an unusable plan the connector heuristic
//! takes over. The execution strategy is always derived from the dependency
//! shape, never requested.

mod complexity;
mod heuristic;
mod llm;

pub use complexity::detect_signals;
pub use heuristic::HeuristicDecomposer;
pub use llm::LlmDecomposer;

use super::run_blocking_with_timeout;
use crate::config::DecomposerConfig;
use crate::llm::LlmProvider;
use crate::models::{ComplexitySignal, DecompositionResult, PlanSource, SubQuery};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// A strategy that splits a complex query into sub-queries.
///
/// Implementations may block; the decomposer runs them off the async runtime.
pub trait DecompositionBackend: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Which plan source results are attributed to.
    fn source(&self) -> PlanSource;

    /// Plans at most `max_sub_queries` sub-queries for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or its answer is unusable.
    fn plan(&self, query: &str, max_sub_queries: usize) -> Result<Vec<SubQuery>>;
}

/// Decides whether and how to split queries.
pub struct Decomposer {
    backend: Option<Arc<dyn DecompositionBackend>>,
    heuristic: HeuristicDecomposer,
    config: DecomposerConfig,
}

impl Decomposer {
    /// Creates a decomposer that only uses the connector heuristic.
    #[must_use]
    pub const fn heuristic_only(config: DecomposerConfig) -> Self {
        Self {
            backend: None,
            heuristic: HeuristicDecomposer::new(),
            config,
        }
    }

    /// Creates a decomposer that tries `backend` first.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn DecompositionBackend>, config: DecomposerConfig) -> Self {
        Self {
            backend: Some(backend),
            ..Self::heuristic_only(config)
        }
    }

    /// Creates a decomposer backed by an LLM provider, if one is given.
    #[must_use]
    pub fn from_provider(provider: Option<Arc<dyn LlmProvider>>, config: DecomposerConfig) -> Self {
        match provider {
            Some(provider) => Self::with_backend(Arc::new(LlmDecomposer::new(provider)), config),
            None => Self::heuristic_only(config),
        }
    }

    /// Returns the complexity signals that fire for `query`.
    #[must_use]
    pub fn signals(&self, query: &str) -> Vec<ComplexitySignal> {
        detect_signals(query)
    }

    /// Returns true if `query` should be split.
    #[must_use]
    pub fn is_complex(&self, query: &str) -> bool {
        self.signals(query).len() >= self.config.complexity_threshold
    }

    /// Decomposes `query`. Never fails.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn decompose(&self, query: &str) -> DecompositionResult {
        let signals = self.signals(query);
        if signals.len() < self.config.complexity_threshold {
            tracing::debug!(signals = signals.len(), "Query is not complex");
            metrics::counter!("strata_decompose_total", "source" => "none").increment(1);
            return DecompositionResult::simple(query, signals);
        }

        let max = self.config.max_sub_queries.max(1);
        let (sub_queries, source) = match &self.backend {
            Some(backend) => match self.plan_with_backend(Arc::clone(backend), query, max).await {
                Ok(plan) => (plan, backend.source()),
                Err(e) => {
                    tracing::debug!(error = %e, "Falling back to heuristic decomposition");
                    (self.heuristic.split(query, max), PlanSource::Heuristic)
                },
            },
            None => (self.heuristic.split(query, max), PlanSource::Heuristic),
        };

        let source_label = match source {
            PlanSource::Llm => "llm",
            PlanSource::Heuristic | PlanSource::None => "heuristic",
        };
        metrics::counter!("strata_decompose_total", "source" => source_label).increment(1);

        let result = DecompositionResult::planned(query, sub_queries, signals, source);
        tracing::debug!(
            sub_queries = result.sub_queries.len(),
            strategy = %result.strategy,
            "Decomposed query"
        );
        result
    }

    async fn plan_with_backend(
        &self,
        backend: Arc<dyn DecompositionBackend>,
        query: &str,
        max: usize,
    ) -> Result<Vec<SubQuery>> {
        let owned = query.to_string();
        let timeout = Duration::from_millis(self.config.llm_timeout_ms);
        let plan =
            run_blocking_with_timeout("decompose", timeout, move || backend.plan(&owned, max))
                .await?;
        sanitize_plan(plan, max)
    }
}

/// Validates and normalizes a backend plan.
///
/// Drops blank sub-queries, truncates to `max`, then removes dependencies on
/// unknown ids or on the sub-query itself. Fewer than two usable sub-queries
/// or duplicate ids make the plan unusable.
///
/// # Errors
///
/// Returns `InvalidInput` if the plan is unusable.
pub fn sanitize_plan(plan: Vec<SubQuery>, max: usize) -> Result<Vec<SubQuery>> {
    let mut subs: Vec<SubQuery> = plan
        .into_iter()
        .filter(|q| !q.query.trim().is_empty())
        .collect();

    if subs.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "plan has {} usable sub-queries, need at least 2",
            subs.len()
        )));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = subs.iter().find(|q| !seen.insert(q.id.as_str())) {
        return Err(Error::InvalidInput(format!("duplicate sub-query id '{}'", dup.id)));
    }

    if subs.len() > max {
        tracing::debug!(planned = subs.len(), max, "Truncating plan");
        subs.truncate(max);
    }

    let ids: HashSet<String> = subs.iter().map(|q| q.id.clone()).collect();
    for sub in &mut subs {
        let own = sub.id.clone();
        let mut kept = HashSet::new();
        sub.dependencies
            .retain(|dep| dep != &own && ids.contains(dep) && kept.insert(dep.clone()));
    }
    Ok(subs)
}
