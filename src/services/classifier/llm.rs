//! Model-backed query classification.

use super::ClassificationBackend;
use crate::Result;
use crate::llm::LlmProvider;
use crate::models::{DetectionSource, QueryJudgment};
use std::sync::Arc;

/// Classifies queries through an [`LlmProvider`].
///
/// Blocking; the [`Classifier`](super::Classifier) runs it on the blocking
/// pool under a timeout.
pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    /// Creates a classifier backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

impl ClassificationBackend for LlmClassifier {
    fn name(&self) -> &'static str {
        self.provider.name()
    }

    fn source(&self) -> DetectionSource {
        DetectionSource::Llm
    }

    fn judge(&self, query: &str) -> Result<QueryJudgment> {
        self.provider.classify_query(query)
    }
}
