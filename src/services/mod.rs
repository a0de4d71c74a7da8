//! Routing services.
//!
//! Services orchestrate memory layers and the optional model backend:
//! classification, fan-out routing, decomposition, multi-hop execution,
//! result fusion, and feedback learning.

mod cache;
mod classifier;
mod decomposer;
mod executor;
mod feedback;
mod fusion;
mod router;

pub use cache::QueryCache;
pub use classifier::{ClassificationBackend, Classifier, KeywordClassifier, LlmClassifier};
pub use decomposer::{
    DecompositionBackend, Decomposer, HeuristicDecomposer, LlmDecomposer, detect_signals,
    sanitize_plan,
};
pub use executor::MultiHopExecutor;
pub use feedback::{
    FEEDBACK_ACTION, FEEDBACK_AGENT, FEEDBACK_ENTRY_TYPE, FeedbackLearner, FileWeightStore,
    InMemoryWeightStore, WEIGHTS_FILE_NAME, WeightBounds, WeightStore,
};
pub use fusion::{
    ContentHasher, FusionOptions, RelevanceScorer, ResultFusion, TermOverlapScorer,
    apply_diversity, deduplicate, normalize_item, query_terms,
};
pub use router::{Router, RouterBuilder};

use crate::{Error, Result};
use std::time::Duration;
use tracing::Span;

/// Runs blocking I/O on the blocking pool inside the current span.
pub(crate) async fn run_blocking<T, F>(operation: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|join_err| Error::OperationFailed {
            operation: operation.to_string(),
            cause: join_err.to_string(),
        })?
}

/// Runs a blocking closure on the blocking pool, bounded by `timeout`.
///
/// The closure runs inside the caller's span. On timeout the closure is left
/// to finish in the background and its result is discarded.
pub(crate) async fn run_blocking_with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let span = Span::current();
    let handle = tokio::task::spawn_blocking(move || span.in_scope(f));

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::OperationFailed {
            operation: operation.to_string(),
            cause: join_err.to_string(),
        }),
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blocking_result_passes_through() {
        let value = run_blocking_with_timeout("add", Duration::from_secs(1), || Ok(2 + 2))
            .await
            .unwrap();
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn test_blocking_timeout() {
        let result: Result<()> = run_blocking_with_timeout("sleep", Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { timeout_ms: 20, .. })));
    }

    #[tokio::test]
    async fn test_blocking_panic_is_operation_failed() {
        let result: Result<()> = run_blocking_with_timeout("panic", Duration::from_secs(1), || {
            panic!("boom");
        })
        .await;
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }
}
