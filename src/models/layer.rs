//! Memory layer identifiers and learned layer weights.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One of the six independent memory layers a query can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerId {
    /// Short-lived session state.
    Session,
    /// Project metadata.
    Project,
    /// User preferences and expertise.
    User,
    /// Vector similarity index.
    Vector,
    /// Dependency graph store.
    Graph,
    /// Governance and audit log.
    Governance,
}

impl LayerId {
    /// Returns all layers in canonical order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Session,
            Self::Project,
            Self::User,
            Self::Vector,
            Self::Graph,
            Self::Governance,
        ]
    }

    /// Returns the layer as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Project => "project",
            Self::User => "user",
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::Governance => "governance",
        }
    }

    /// Parses a layer name (case-insensitive, with a few aliases).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "session" | "sessions" => Some(Self::Session),
            "project" | "projects" => Some(Self::Project),
            "user" | "users" | "preferences" => Some(Self::User),
            "vector" | "vectors" | "semantic" => Some(Self::Vector),
            "graph" | "dependency_graph" | "dependencies" => Some(Self::Graph),
            "governance" | "audit" | "history" => Some(Self::Governance),
            _ => None,
        }
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Learned trust weight per layer.
///
/// Every layer starts at `1.0`. Weights are only ever changed by positive
/// multiplicative factors, so they never become negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerWeights {
    weights: BTreeMap<LayerId, f64>,
}

impl Default for LayerWeights {
    fn default() -> Self {
        Self {
            weights: LayerId::all().iter().map(|layer| (*layer, 1.0)).collect(),
        }
    }
}

impl LayerWeights {
    /// Weight assumed for a layer that has never been adjusted.
    pub const DEFAULT_WEIGHT: f64 = 1.0;

    /// Creates weights with every layer at the default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the weight for a layer.
    #[must_use]
    pub fn get(&self, layer: LayerId) -> f64 {
        self.weights
            .get(&layer)
            .copied()
            .unwrap_or(Self::DEFAULT_WEIGHT)
    }

    /// Sets the weight for a layer. Negative or non-finite values are ignored.
    pub fn set(&mut self, layer: LayerId, weight: f64) {
        if weight.is_finite() && weight >= 0.0 {
            self.weights.insert(layer, weight);
        } else {
            tracing::warn!(layer = %layer, weight, "Ignoring invalid layer weight");
        }
    }

    /// Multiplies a layer's weight by `factor` and returns the new weight.
    pub fn scale(&mut self, layer: LayerId, factor: f64) -> f64 {
        let updated = self.get(layer) * factor;
        self.set(layer, updated);
        self.get(layer)
    }

    /// Iterates over all stored weights.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, f64)> + '_ {
        self.weights.iter().map(|(layer, weight)| (*layer, *weight))
    }
}

/// Weights shared between the feedback learner (writer) and classifier (reader).
pub type SharedLayerWeights = Arc<RwLock<LayerWeights>>;

/// Creates a shared handle around the given weights.
#[must_use]
pub fn shared_weights(weights: LayerWeights) -> SharedLayerWeights {
    Arc::new(RwLock::new(weights))
}

/// Reads a snapshot of shared weights, recovering from lock poisoning.
#[must_use]
pub fn snapshot_weights(shared: &SharedLayerWeights) -> LayerWeights {
    shared
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_parse_roundtrip() {
        for layer in LayerId::all() {
            assert_eq!(LayerId::parse(layer.as_str()), Some(*layer));
        }
        assert_eq!(LayerId::parse("AUDIT"), Some(LayerId::Governance));
        assert_eq!(LayerId::parse("nope"), None);
    }

    #[test]
    fn test_default_weights_are_one() {
        let weights = LayerWeights::default();
        for layer in LayerId::all() {
            assert!((weights.get(*layer) - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut weights = LayerWeights::default();
        weights.set(LayerId::User, -0.5);
        assert!((weights.get(LayerId::User) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scale() {
        let mut weights = LayerWeights::default();
        let updated = weights.scale(LayerId::Graph, 1.1);
        assert!((updated - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_weights_serialize_as_map() {
        let json = serde_json::to_string(&LayerWeights::default()).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("\"governance\":1.0"));
    }
}
