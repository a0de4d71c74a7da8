//! Query classification.
//!
//! Maps a query to a [`QueryType`], a confidence, and the layers to query.
//! A model backend is tried first when configured; any failure, timeout, or
//! unparsable output falls back to [`KeywordClassifier`]. Layer weights are
//! the type's policy weights scaled by learned feedback weights.
//!
//! # Flow
//!
//! ```text
//! query ─► backend (blocking pool, timeout) ─┬─ ok ───► low-confidence check ─┐
//!                                            └─ fail ─► keyword rules ────────┤
//!                                                                             ▼
//!                                               policy table × learned weights
//! ```

mod keyword;
mod llm;

pub use keyword::KeywordClassifier;
pub use llm::LlmClassifier;

use super::run_blocking_with_timeout;
use crate::config::ClassifierConfig;
use crate::llm::LlmProvider;
use crate::models::{
    ClassificationResult, DetectionSource, QueryJudgment, QueryType, SharedLayerWeights,
    snapshot_weights,
};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// A strategy that judges a query's type.
///
/// Implementations may block; the classifier runs them off the async runtime.
pub trait ClassificationBackend: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Which detection source results are attributed to.
    fn source(&self) -> DetectionSource;

    /// Judges `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or its answer is unusable.
    fn judge(&self, query: &str) -> Result<QueryJudgment>;
}

/// Classifies queries into routing decisions.
pub struct Classifier {
    backend: Option<Arc<dyn ClassificationBackend>>,
    keywords: KeywordClassifier,
    config: ClassifierConfig,
    learned: Option<SharedLayerWeights>,
}

impl Classifier {
    /// Creates a classifier that only uses keyword rules.
    #[must_use]
    pub const fn keyword_only(config: ClassifierConfig) -> Self {
        Self {
            backend: None,
            keywords: KeywordClassifier::new(),
            config,
            learned: None,
        }
    }

    /// Creates a classifier that tries `backend` first.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn ClassificationBackend>, config: ClassifierConfig) -> Self {
        Self {
            backend: Some(backend),
            ..Self::keyword_only(config)
        }
    }

    /// Creates a classifier backed by an LLM provider, if one is given.
    #[must_use]
    pub fn from_provider(provider: Option<Arc<dyn LlmProvider>>, config: ClassifierConfig) -> Self {
        match provider {
            Some(provider) => Self::with_backend(Arc::new(LlmClassifier::new(provider)), config),
            None => Self::keyword_only(config),
        }
    }

    /// Scales policy weights by the given learned weights.
    #[must_use]
    pub fn with_learned_weights(mut self, weights: SharedLayerWeights) -> Self {
        self.learned = Some(weights);
        self
    }

    /// Classifies `query`. Never fails.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn classify(&self, query: &str) -> ClassificationResult {
        let start = Instant::now();

        let (judgment, source) = match &self.backend {
            Some(backend) if !query.trim().is_empty() => {
                match self.judge_with_backend(Arc::clone(backend), query).await {
                    Ok(judgment) => (self.apply_confidence_floor(judgment), backend.source()),
                    Err(e) => {
                        tracing::debug!(error = %e, "Falling back to keyword classification");
                        (self.keywords.judge_keywords(query), DetectionSource::Keyword)
                    },
                }
            },
            _ => (self.keywords.judge_keywords(query), DetectionSource::Keyword),
        };

        let result = self.build_result(query, judgment, source);

        metrics::counter!(
            "strata_classify_total",
            "type" => result.query_type.as_str(),
            "source" => source.as_str()
        )
        .increment(1);
        #[allow(clippy::cast_precision_loss)]
        let elapsed = crate::elapsed_ms(start) as f64;
        metrics::histogram!("strata_classify_duration_ms").record(elapsed);

        tracing::debug!(
            query_type = %result.query_type,
            confidence = result.confidence,
            source = source.as_str(),
            "Classified query"
        );
        result
    }

    /// Classifies `query` with keyword rules only, synchronously.
    #[must_use]
    pub fn classify_with_keywords(&self, query: &str) -> ClassificationResult {
        let judgment = self.keywords.judge_keywords(query);
        self.build_result(query, judgment, DetectionSource::Keyword)
    }

    async fn judge_with_backend(
        &self,
        backend: Arc<dyn ClassificationBackend>,
        query: &str,
    ) -> Result<QueryJudgment> {
        let name = backend.name();
        let owned = query.to_string();
        let timeout = Duration::from_millis(self.config.llm_timeout_ms);

        let result =
            run_blocking_with_timeout("classify", timeout, move || backend.judge(&owned)).await;

        let status = match &result {
            Ok(_) => "success",
            Err(Error::Timeout { .. }) => "timeout",
            Err(Error::InvalidInput(_)) => "parse_error",
            Err(_) => "error",
        };
        metrics::counter!("strata_classifier_backend_total", "backend" => name, "status" => status)
            .increment(1);
        result
    }

    fn apply_confidence_floor(&self, judgment: QueryJudgment) -> QueryJudgment {
        if judgment.confidence >= self.config.min_confidence {
            return judgment;
        }
        QueryJudgment {
            reasoning: format!(
                "low confidence ({:.2}) for {}; routing to all layers",
                judgment.confidence, judgment.query_type
            ),
            query_type: QueryType::General,
            confidence: judgment.confidence,
        }
    }

    fn build_result(
        &self,
        query: &str,
        judgment: QueryJudgment,
        source: DetectionSource,
    ) -> ClassificationResult {
        let mut result = ClassificationResult::from_policy(
            query,
            judgment.query_type,
            judgment.confidence,
            judgment.reasoning,
            source,
        );

        if let Some(learned) = &self.learned {
            let learned = snapshot_weights(learned);
            for (layer, weight) in &mut result.weights {
                #[allow(clippy::cast_possible_truncation)]
                let factor = learned.get(*layer) as f32;
                *weight *= factor;
            }
        }
        result
    }
}
