//! Query classification types.
//!
//! A [`QueryType`] carries a fixed routing policy: the layers to query and a
//! per-layer weight. Weights are routing hints and do not need to sum to 1.
//!
//! | Type | Layers (weight) |
//! |------|-----------------|
//! | `Procedural` | session (0.4), project (0.3), vector (0.3) |
//! | `Factual` | vector (0.6), graph (0.4) |
//! | `Architectural` | graph (0.5), project (0.3), governance (0.2) |
//! | `User` | user (1.0) |
//! | `Historical` | governance (0.5), project (0.5) |
//! | `General` | all six layers |

use super::LayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of information a query is seeking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    /// Continuing or carrying out work ("continue", "implement").
    Procedural,
    /// Facts and explanations ("what is", "explain").
    Factual,
    /// Structure and dependencies ("architecture", "dependencies").
    Architectural,
    /// The user's own preferences or expertise.
    User,
    /// Past decisions and their rationale.
    Historical,
    /// Anything else; routes to every layer.
    #[default]
    General,
}

impl QueryType {
    /// Returns every query type.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Procedural,
            Self::Factual,
            Self::Architectural,
            Self::User,
            Self::Historical,
            Self::General,
        ]
    }

    /// Returns the fixed routing policy for this type, in query order.
    #[must_use]
    pub const fn routing_policy(&self) -> &'static [(LayerId, f32)] {
        match self {
            Self::Procedural => &[
                (LayerId::Session, 0.4),
                (LayerId::Project, 0.3),
                (LayerId::Vector, 0.3),
            ],
            Self::Factual => &[(LayerId::Vector, 0.6), (LayerId::Graph, 0.4)],
            Self::Architectural => &[
                (LayerId::Graph, 0.5),
                (LayerId::Project, 0.3),
                (LayerId::Governance, 0.2),
            ],
            Self::User => &[(LayerId::User, 1.0)],
            Self::Historical => &[(LayerId::Governance, 0.5), (LayerId::Project, 0.5)],
            Self::General => &[
                (LayerId::Session, 0.2),
                (LayerId::Project, 0.2),
                (LayerId::User, 0.1),
                (LayerId::Vector, 0.2),
                (LayerId::Graph, 0.2),
                (LayerId::Governance, 0.1),
            ],
        }
    }

    /// Parses a type name as emitted by a model (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "procedural" | "procedure" | "task" => Some(Self::Procedural),
            "factual" | "fact" | "explanation" => Some(Self::Factual),
            "architectural" | "architecture" => Some(Self::Architectural),
            "user" | "preference" | "personal" => Some(Self::User),
            "historical" | "history" | "decision" => Some(Self::Historical),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Procedural => "PROCEDURAL",
            Self::Factual => "FACTUAL",
            Self::Architectural => "ARCHITECTURAL",
            Self::User => "USER",
            Self::Historical => "HISTORICAL",
            Self::General => "GENERAL",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a classification was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Deterministic keyword rules.
    #[default]
    Keyword,
    /// Language-model judgment.
    Llm,
}

impl DetectionSource {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Llm => "llm",
        }
    }
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw judgment returned by a classification backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryJudgment {
    /// Judged query type.
    pub query_type: QueryType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Free-form explanation.
    pub reasoning: String,
}

/// Outcome of classifying one query. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The query exactly as given.
    pub query: String,
    /// Final query type.
    pub query_type: QueryType,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Layers to query, in policy order. Never empty.
    pub layers: Vec<LayerId>,
    /// Effective weight per target layer.
    pub weights: BTreeMap<LayerId, f32>,
    /// Explanation of the decision.
    pub reasoning: String,
    /// Which backend produced the judgment.
    pub source: DetectionSource,
}

impl ClassificationResult {
    /// Builds a result using the policy weights of `query_type` unchanged.
    #[must_use]
    pub fn from_policy(
        query: impl Into<String>,
        query_type: QueryType,
        confidence: f32,
        reasoning: impl Into<String>,
        source: DetectionSource,
    ) -> Self {
        let policy = query_type.routing_policy();
        Self {
            query: query.into(),
            query_type,
            confidence: confidence.clamp(0.0, 1.0),
            layers: policy.iter().map(|(layer, _)| *layer).collect(),
            weights: policy.iter().copied().collect(),
            reasoning: reasoning.into(),
            source,
        }
    }

    /// Returns the weight assigned to a layer, or 0 if it is not targeted.
    #[must_use]
    pub fn weight(&self, layer: LayerId) -> f32 {
        self.weights.get(&layer).copied().unwrap_or(0.0)
    }
}
