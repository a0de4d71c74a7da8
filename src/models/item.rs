//! Retrieved content items and fusion output.

use super::LayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalized unit of retrieved content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Text content.
    pub content: String,
    /// Layer the item came from.
    pub layer: LayerId,
    /// Routing weight of the source layer.
    #[serde(default)]
    pub layer_weight: f32,
    /// Unix timestamp in seconds, when the layer knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Layer-specific metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MemoryItem {
    /// Creates an item with no timestamp or metadata.
    #[must_use]
    pub fn new(content: impl Into<String>, layer: LayerId) -> Self {
        Self {
            content: content.into(),
            layer,
            layer_weight: 0.0,
            timestamp: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Estimated token count (about one token per four characters).
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

/// Estimates tokens for a text as `ceil(chars / 4)`.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Raw item returned by a layer collaborator.
///
/// Layers may return pre-normalized items, plain text, or arbitrary records;
/// fusion normalizes all three into [`MemoryItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerItem {
    /// Already normalized.
    Memory(MemoryItem),
    /// Plain text.
    Text(String),
    /// Structured record; a content-bearing field is extracted.
    Record(serde_json::Value),
}

impl From<MemoryItem> for LayerItem {
    fn from(item: MemoryItem) -> Self {
        Self::Memory(item)
    }
}

impl From<String> for LayerItem {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for LayerItem {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for LayerItem {
    fn from(value: serde_json::Value) -> Self {
        Self::Record(value)
    }
}

/// A memory item with a relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// The item.
    pub item: MemoryItem,
    /// Relevance score, nominally in `[0, 1]`.
    pub score: f32,
}

impl ScoredItem {
    /// Creates a scored item.
    #[must_use]
    pub const fn new(item: MemoryItem, score: f32) -> Self {
        Self { item, score }
    }
}

/// Statistics from one fusion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    /// Items considered after normalization.
    pub total_items: usize,
    /// Items remaining after deduplication.
    pub after_dedup: usize,
    /// Items in the final output.
    pub final_count: usize,
    /// Estimated tokens of the final output.
    pub estimated_tokens: usize,
    /// Wall-clock time of the fusion pass.
    pub fusion_time_ms: u64,
}

/// Ranked, deduplicated, token-bounded context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    /// Items in descending score order.
    pub items: Vec<ScoredItem>,
    /// Pass statistics.
    pub stats: FusionStats,
}

impl FusedResult {
    /// Mean item score, or 0 when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_score(&self) -> f32 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.items.iter().map(|i| i.score).sum::<f32>() / self.items.len() as f32
    }
}
