//! Fixed-content layer for wiring, demos and tests.

use super::MemoryLayer;
use crate::Result;
use crate::models::{LayerId, LayerItem};
use async_trait::async_trait;
use std::time::Duration;

/// A layer that answers every query with the same items.
///
/// An optional latency simulates a slow backing store.
#[derive(Debug, Clone)]
pub struct StaticLayer {
    id: LayerId,
    items: Vec<LayerItem>,
    latency: Option<Duration>,
}

impl StaticLayer {
    /// Creates a layer returning `items`.
    #[must_use]
    pub fn new(id: LayerId, items: Vec<LayerItem>) -> Self {
        Self {
            id,
            items,
            latency: None,
        }
    }

    /// Creates a layer returning plain-text items.
    #[must_use]
    pub fn with_texts(id: LayerId, texts: &[&str]) -> Self {
        Self::new(id, texts.iter().map(|t| LayerItem::from(*t)).collect())
    }

    /// Delays every answer by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl MemoryLayer for StaticLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    async fn query(&self, _text: &str) -> Result<Vec<LayerItem>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.items.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_layer_returns_items() {
        let layer = StaticLayer::with_texts(LayerId::Session, &["a", "b"]);
        let items = layer.query("anything").await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(layer.id(), LayerId::Session);
    }
}
