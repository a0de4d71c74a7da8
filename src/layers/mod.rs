//! Memory layer collaborators.
//!
//! Each memory layer (session state, project metadata, user preferences,
//! vector index, dependency graph, governance log) is an external store.
//! Strata only depends on the uniform query contract defined here.
//!
//! # Contract
//!
//! | Method | Returns | Failure |
//! |--------|---------|---------|
//! | [`MemoryLayer::query`] | Items (text, record, or normalized) | `Err` isolates this layer only |
//!
//! Layers must be safe for concurrent reads. Strata never mutates a layer.
//! Retries, if any, are the layer's responsibility.

mod governance;
mod static_layer;

pub use governance::{
    EntryFilter, GovernanceEntry, GovernanceLayer, GovernanceLog, InMemoryGovernanceLog,
};
pub use static_layer::StaticLayer;

use crate::Result;
use crate::models::{LayerId, LayerItem};
use async_trait::async_trait;

/// Query interface implemented by every memory layer.
#[async_trait]
pub trait MemoryLayer: Send + Sync {
    /// The layer this collaborator serves.
    fn id(&self) -> LayerId;

    /// Returns items relevant to `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot answer.
    async fn query(&self, text: &str) -> Result<Vec<LayerItem>>;
}
