//! Feedback records and learning statistics.

use super::{ClassificationResult, LayerId, QueryType, RoutingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user's judgment of one routed answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Whether the answer helped.
    pub helpful: bool,
    /// Layers that should have been queried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_layers: Option<Vec<LayerId>>,
    /// Type the query should have been classified as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_type: Option<QueryType>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Feedback {
    /// Positive feedback with no corrections.
    #[must_use]
    pub const fn helpful() -> Self {
        Self {
            helpful: true,
            correct_layers: None,
            correct_type: None,
            comment: None,
        }
    }

    /// Negative feedback with no corrections.
    #[must_use]
    pub const fn unhelpful() -> Self {
        Self {
            helpful: false,
            correct_layers: None,
            correct_type: None,
            comment: None,
        }
    }

    /// Sets the corrected layers.
    #[must_use]
    pub fn with_correct_layers(mut self, layers: Vec<LayerId>) -> Self {
        self.correct_layers = Some(layers);
        self
    }

    /// Sets the corrected type.
    #[must_use]
    pub const fn with_correct_type(mut self, query_type: QueryType) -> Self {
        self.correct_type = Some(query_type);
        self
    }

    /// Sets a comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Compact view of a routing result kept in feedback records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSummary {
    /// Layers that were queried, in order.
    pub layers: Vec<LayerId>,
    /// Layers that answered.
    pub succeeded: usize,
    /// Layers that failed.
    pub failed: usize,
    /// Items returned across layers.
    pub item_count: usize,
    /// Whether the routing came from cache.
    pub cache_hit: bool,
    /// Routing wall-clock time.
    pub total_time_ms: u64,
    /// Per-layer error annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<LayerId, String>,
}

impl From<&RoutingResult> for RoutingSummary {
    fn from(routing: &RoutingResult) -> Self {
        Self {
            layers: routing.results.iter().map(|r| r.layer).collect(),
            succeeded: routing.stats.succeeded,
            failed: routing.stats.failed,
            item_count: routing.item_count(),
            cache_hit: routing.stats.cache_hit,
            total_time_ms: routing.stats.total_time_ms,
            errors: routing
                .results
                .iter()
                .filter_map(|r| r.error().map(|e| (r.layer, e.to_string())))
                .collect(),
        }
    }
}

/// One stored user judgment. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Record id (UUID v4).
    pub id: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// The query.
    pub query: String,
    /// Classification that was used.
    pub classification: ClassificationResult,
    /// Routing outcome.
    pub routing: RoutingSummary,
    /// The user's judgment.
    pub feedback: Feedback,
    /// Caller-provided context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl FeedbackRecord {
    /// Returns the "classified X as Y" pattern when the type was corrected.
    #[must_use]
    pub fn correction_pattern(&self) -> Option<String> {
        let corrected = self.feedback.correct_type?;
        let predicted = self.classification.query_type;
        (corrected != predicted).then(|| format!("classified {predicted} as {corrected}"))
    }
}

/// A frequent correction and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionPattern {
    /// Pattern text.
    pub pattern: String,
    /// Occurrences.
    pub count: usize,
}

/// Aggregate learning statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    /// Number of feedback records.
    pub total_feedback: usize,
    /// Percentage of records marked helpful.
    pub helpful_rate: f64,
    /// Up to five most frequent corrections.
    pub common_corrections: Vec<CorrectionPattern>,
    /// Helpful-rate change between the first and last ten records, in
    /// percentage points. Zero with fewer than twenty records.
    pub accuracy_improvement: f64,
}

/// Flattened feedback tuple for offline fine-tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuneExample {
    /// The query.
    pub query: String,
    /// Predicted type.
    pub predicted_type: QueryType,
    /// Prediction confidence.
    pub confidence: f32,
    /// Predicted layers.
    pub layers: Vec<LayerId>,
    /// Whether the answer helped.
    pub helpful: bool,
    /// Corrected type, if given.
    pub correct_type: Option<QueryType>,
    /// Corrected layers, if given.
    pub correct_layers: Option<Vec<LayerId>>,
    /// When the feedback was recorded (RFC 3339).
    pub recorded_at: String,
}

impl From<&FeedbackRecord> for FineTuneExample {
    fn from(record: &FeedbackRecord) -> Self {
        let recorded_at = i64::try_from(record.timestamp)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        Self {
            query: record.query.clone(),
            predicted_type: record.classification.query_type,
            confidence: record.classification.confidence,
            layers: record.classification.layers.clone(),
            helpful: record.feedback.helpful,
            correct_type: record.feedback.correct_type,
            correct_layers: record.feedback.correct_layers.clone(),
            recorded_at,
        }
    }
}
