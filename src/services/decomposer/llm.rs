//! Model-backed query decomposition.

use super::DecompositionBackend;
use crate::Result;
use crate::llm::LlmProvider;
use crate::models::{PlanSource, SubQuery};
use std::sync::Arc;

/// Plans sub-queries through an [`LlmProvider`].
pub struct LlmDecomposer {
    provider: Arc<dyn LlmProvider>,
}

impl LlmDecomposer {
    /// Creates a decomposer backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

impl DecompositionBackend for LlmDecomposer {
    fn name(&self) -> &'static str {
        self.provider.name()
    }

    fn source(&self) -> PlanSource {
        PlanSource::Llm
    }

    fn plan(&self, query: &str, max_sub_queries: usize) -> Result<Vec<SubQuery>> {
        self.provider.decompose_query(query, max_sub_queries)
    }
}
