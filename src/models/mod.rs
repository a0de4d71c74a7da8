//! Data models for strata.
//!
//! This module contains all the core data structures used throughout the system.

mod classification;
mod decomposition;
mod feedback;
mod item;
mod layer;
mod routing;

pub use classification::{ClassificationResult, DetectionSource, QueryJudgment, QueryType};
pub use decomposition::{
    ComplexitySignal, DecompositionResult, ExecutionStrategy, HopResult, MultiHopResult,
    MultiHopStats, PlanSource, SubQuery,
};
pub use feedback::{
    CorrectionPattern, Feedback, FeedbackRecord, FineTuneExample, LearningStats, RoutingSummary,
};
pub use item::{FusedResult, FusionStats, LayerItem, MemoryItem, ScoredItem, estimate_tokens};
pub use layer::{LayerId, LayerWeights, SharedLayerWeights, shared_weights, snapshot_weights};
pub use routing::{LayerError, LayerResult, RoutingResult, RoutingStats};
