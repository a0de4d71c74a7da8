//! Normalization of raw layer output into [`MemoryItem`]s.

use crate::models::{LayerId, LayerItem, MemoryItem};
use serde_json::Value;
use std::collections::BTreeMap;

/// Record fields searched for content, in order.
const CONTENT_FIELDS: &[&str] = &["text", "message", "content", "data", "value"];

/// Converts a raw layer item into a [`MemoryItem`] attributed to `layer`.
///
/// Pre-normalized items have their source layer and weight overwritten.
/// Records use the first non-empty string among `text`, `message`,
/// `content`, `data`, `value`, falling back to their compact JSON form.
/// Returns `None` for `null` records and blank content.
#[must_use]
pub fn normalize_item(item: &LayerItem, layer: LayerId, layer_weight: f32) -> Option<MemoryItem> {
    let normalized = match item {
        LayerItem::Memory(memory) => MemoryItem {
            layer,
            layer_weight,
            ..memory.clone()
        },
        LayerItem::Text(text) => MemoryItem {
            layer_weight,
            ..MemoryItem::new(text.clone(), layer)
        },
        LayerItem::Record(record) => record_to_item(record, layer, layer_weight)?,
    };

    if normalized.content.trim().is_empty() {
        return None;
    }
    Some(normalized)
}

fn record_to_item(record: &Value, layer: LayerId, layer_weight: f32) -> Option<MemoryItem> {
    let mut metadata = BTreeMap::new();
    let content = match record {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            let found = CONTENT_FIELDS.iter().find_map(|field| {
                map.get(*field)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| (*field, s))
            });
            match found {
                Some((field, text)) => {
                    metadata.extend(
                        map.iter()
                            .filter(|(key, _)| key.as_str() != field)
                            .map(|(key, value)| (key.clone(), value.clone())),
                    );
                    text.to_string()
                },
                None => record.to_string(),
            }
        },
        other => other.to_string(),
    };

    let mut item = MemoryItem {
        layer_weight,
        metadata,
        ..MemoryItem::new(content, layer)
    };
    if let Some(ts) = record.get("timestamp").and_then(Value::as_u64) {
        item.timestamp = Some(ts);
    }
    Some(item)
}
