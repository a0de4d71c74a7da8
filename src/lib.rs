//! # Strata
//!
//! Adaptive multi-layer memory routing for AI coding assistants.
//!
//! Strata answers a natural-language query by deciding which memory layers
//! are relevant, querying them concurrently with failure isolation, and fusing
//! the results into a ranked, deduplicated, token-bounded context.
//!
//! ## Pipeline
//!
//! ```text
//! query ─► Classifier ─┬─► Router ─► per-layer results
//!                      │
//!                      └─► Decomposer ─► MultiHopExecutor ─► (per hop) Router ─► ResultFusion
//!
//! FeedbackLearner ─► LayerWeights ─► Classifier (next query)
//! ```
//!
//! ## Memory Layers
//!
//! | Layer | Holds |
//! |-------|-------|
//! | `session` | Short-lived session state |
//! | `project` | Project metadata |
//! | `user` | User preferences |
//! | `vector` | Vector similarity index |
//! | `graph` | Dependency graph store |
//! | `governance` | Governance and audit log |
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata::{Classifier, Router, StrataConfig};
//!
//! let config = StrataConfig::load_default();
//! let classifier = Arc::new(Classifier::keyword_only(config.classifier.clone()));
//! let router = Router::builder(classifier)
//!     .with_config(config.router.clone())
//!     .with_layer(session_layer)
//!     .with_layer(vector_layer)
//!     .build();
//!
//! let routing = router.route("Continue working on auth").await;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod layers;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;

// Re-exports for convenience
pub use config::StrataConfig;
pub use layers::{GovernanceLog, MemoryLayer};
pub use llm::LlmProvider;
pub use models::{
    ClassificationResult, DecompositionResult, ExecutionStrategy, Feedback, FeedbackRecord,
    FusedResult, HopResult, LayerId, LayerItem, LayerResult, LayerWeights, MemoryItem, QueryType,
    RoutingResult, SubQuery,
};
pub use services::{
    Classifier, Decomposer, FeedbackLearner, MultiHopExecutor, ResultFusion, Router,
};

/// Error type for strata operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed model output, unknown layer or type names |
/// | `OperationFailed` | I/O errors, HTTP failures, governance log failures |
/// | `Timeout` | A bounded operation exceeded its time budget |
///
/// Routing and multi-hop execution never return these to the caller for a
/// single failing branch; branch errors are recorded on the branch result.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A model response cannot be parsed into the expected structure
    /// - A layer id or query type string is not recognized
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Weight or export files cannot be read or written
    /// - An LLM HTTP request fails
    /// - A layer collaborator rejects a query
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A time-bounded operation did not complete in time.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },
}

/// Result type alias for strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use strata::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[must_use]
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
