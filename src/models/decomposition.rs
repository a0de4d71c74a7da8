//! Query decomposition and multi-hop execution types.

use super::{ClassificationResult, FusedResult, ScoredItem};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One node of a decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    /// Identifier, unique within one decomposition.
    pub id: String,
    /// Query text.
    pub query: String,
    /// Ids of sub-queries that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Higher runs earlier under the sequential strategy.
    #[serde(default)]
    pub priority: u8,
}

impl SubQuery {
    /// Creates a sub-query with no dependencies.
    #[must_use]
    pub fn new(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            dependencies: Vec::new(),
            priority: 0,
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// How a set of sub-queries is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One after another, in dependency order.
    Sequential,
    /// All at once.
    #[default]
    Parallel,
    /// Dependency levels in order, each level in concurrent batches.
    Hybrid,
}

impl ExecutionStrategy {
    /// Derives the strategy from the dependency shape.
    ///
    /// - No dependencies at all: `Parallel`.
    /// - A strict chain where each sub-query depends only on its immediate
    ///   predecessor: `Sequential`.
    /// - Any other shape: `Hybrid`.
    #[must_use]
    pub fn derive(sub_queries: &[SubQuery]) -> Self {
        if sub_queries.iter().all(|q| q.dependencies.is_empty()) {
            return Self::Parallel;
        }

        let is_chain = sub_queries.iter().enumerate().all(|(i, q)| {
            if i == 0 {
                q.dependencies.is_empty()
            } else {
                q.dependencies.len() == 1 && q.dependencies[0] == sub_queries[i - 1].id
            }
        });

        if is_chain {
            Self::Sequential
        } else {
            Self::Hybrid
        }
    }

    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signals that mark a query as compound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexitySignal {
    /// Flow or process vocabulary ("flow", "workflow", "pipeline").
    FlowVocabulary,
    /// Sequential connectors ("then", "after").
    SequentialConnector,
    /// A "from X to Y" span.
    FromToPattern,
    /// More than two "and"-separated clauses.
    ManyClauses,
    /// A "how does X work" question.
    HowDoesItWork,
    /// More than ten words.
    LongQuery,
    /// More than one question mark.
    MultipleQuestions,
}

/// Which backend planned the sub-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// The query was not complex; nothing was planned.
    #[default]
    None,
    /// Language-model plan.
    Llm,
    /// Connector-splitting heuristic.
    Heuristic,
}

/// Whether and how a query is split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionResult {
    /// The original query.
    pub query: String,
    /// Whether the query was judged compound.
    pub is_complex: bool,
    /// Planned sub-queries (empty when not complex).
    pub sub_queries: Vec<SubQuery>,
    /// Derived execution strategy.
    pub strategy: ExecutionStrategy,
    /// Signals that fired during the complexity check.
    pub signals: Vec<ComplexitySignal>,
    /// Which backend produced the plan.
    pub source: PlanSource,
}

impl DecompositionResult {
    /// A result for a query that does not need splitting.
    #[must_use]
    pub fn simple(query: impl Into<String>, signals: Vec<ComplexitySignal>) -> Self {
        Self {
            query: query.into(),
            is_complex: false,
            sub_queries: Vec::new(),
            strategy: ExecutionStrategy::Parallel,
            signals,
            source: PlanSource::None,
        }
    }

    /// A result for a planned compound query; the strategy is derived.
    #[must_use]
    pub fn planned(
        query: impl Into<String>,
        sub_queries: Vec<SubQuery>,
        signals: Vec<ComplexitySignal>,
        source: PlanSource,
    ) -> Self {
        let strategy = ExecutionStrategy::derive(&sub_queries);
        Self {
            query: query.into(),
            is_complex: true,
            sub_queries,
            strategy,
            signals,
            source,
        }
    }

    /// Ids of all sub-queries.
    #[must_use]
    pub fn ids(&self) -> HashSet<&str> {
        self.sub_queries.iter().map(|q| q.id.as_str()).collect()
    }
}

/// Outcome of one hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopResult {
    /// Sub-query id.
    pub sub_query_id: String,
    /// Sub-query text.
    pub query: String,
    /// Classification of the sub-query, if the hop got that far.
    pub classification: Option<ClassificationResult>,
    /// Fused context items.
    pub context: Vec<ScoredItem>,
    /// Mean item score, 0 if empty.
    pub relevance: f32,
    /// Hop wall-clock time.
    pub elapsed_ms: u64,
    /// Failure annotation ("Timeout" or a cause).
    pub error: Option<String>,
}

impl HopResult {
    /// An empty hop carrying an error annotation.
    #[must_use]
    pub fn failed(sub_query: &SubQuery, error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            sub_query_id: sub_query.id.clone(),
            query: sub_query.query.clone(),
            classification: None,
            context: Vec::new(),
            relevance: 0.0,
            elapsed_ms,
            error: Some(error.into()),
        }
    }

    /// Returns true if the hop completed without error.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate statistics for a multi-hop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiHopStats {
    /// Number of hops executed.
    pub hop_count: usize,
    /// Time spent decomposing.
    pub decomposition_ms: u64,
    /// Time spent executing hops.
    pub execution_ms: u64,
    /// Time spent combining hop contexts.
    pub combination_ms: u64,
    /// Mean context items per hop.
    pub avg_results_per_hop: f32,
    /// Fraction of items removed as duplicates when combining.
    pub dedup_rate: f32,
    /// Estimated tokens of the combined context.
    pub estimated_tokens: usize,
}

/// Per-hop results plus the combined context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiHopResult {
    /// The decomposition that was executed.
    pub decomposition: DecompositionResult,
    /// Hop results in sub-query order.
    pub hops: Vec<HopResult>,
    /// All hop contexts fused against the original query.
    pub context: FusedResult,
    /// Run statistics.
    pub stats: MultiHopStats,
}
