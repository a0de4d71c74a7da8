//! Routing results.

use super::{ClassificationResult, LayerId, LayerItem};
use serde::{Deserialize, Serialize};

/// Why a single layer produced no items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LayerError {
    /// The layer did not answer within the routing timeout.
    Timeout,
    /// The layer rejected the query.
    Failed(String),
    /// No collaborator is registered for the layer.
    NotRegistered,
    /// The layer task panicked or was cancelled.
    Aborted(String),
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Timeout"),
            Self::Failed(cause) => write!(f, "Failed: {cause}"),
            Self::NotRegistered => write!(f, "Layer not registered"),
            Self::Aborted(cause) => write!(f, "Aborted: {cause}"),
        }
    }
}

impl std::error::Error for LayerError {}

/// Outcome of querying one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerResult {
    /// The layer queried.
    pub layer: LayerId,
    /// Items on success, the isolated error otherwise.
    pub outcome: Result<Vec<LayerItem>, LayerError>,
    /// Classification weight of the layer.
    pub weight: f32,
    /// Time spent on this layer.
    pub elapsed_ms: u64,
}

impl LayerResult {
    /// Returns the items, or an empty slice if the layer failed.
    #[must_use]
    pub fn items(&self) -> &[LayerItem] {
        self.outcome.as_deref().unwrap_or(&[])
    }

    /// Returns the error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&LayerError> {
        self.outcome.as_ref().err()
    }

    /// Returns true if the layer answered.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Aggregate statistics for one router call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStats {
    /// Wall-clock time of the call.
    pub total_time_ms: u64,
    /// Number of target layers.
    pub layers_queried: usize,
    /// Whether the result came from the cache.
    pub cache_hit: bool,
    /// Layers that answered.
    pub succeeded: usize,
    /// Layers that failed or timed out.
    pub failed: usize,
}

/// Aggregate of one router call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    /// The query exactly as given.
    pub query: String,
    /// Classification that selected the layers.
    pub classification: ClassificationResult,
    /// One entry per target layer, in classification order.
    pub results: Vec<LayerResult>,
    /// Call statistics.
    pub stats: RoutingStats,
}

impl RoutingResult {
    /// Returns the result for a given layer.
    #[must_use]
    pub fn layer(&self, layer: LayerId) -> Option<&LayerResult> {
        self.results.iter().find(|r| r.layer == layer)
    }

    /// Returns the successful layer results only.
    pub fn successful(&self) -> impl Iterator<Item = &LayerResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Total number of items across all successful layers.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.successful().map(|r| r.items().len()).sum()
    }
}
