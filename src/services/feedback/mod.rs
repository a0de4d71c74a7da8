//! Feedback learning.
//!
//! Every judgment is appended to the governance log as an immutable
//! [`FeedbackRecord`]. Layer corrections adjust the shared [`LayerWeights`]
//! multiplicatively: layers the user marked as correct are boosted, predicted
//! layers the user left out decay. Updated weights are persisted through a
//! [`WeightStore`]; saves are serialized by a single-writer mutex.

mod weights;

pub use weights::{FileWeightStore, InMemoryWeightStore, WEIGHTS_FILE_NAME, WeightStore};

use crate::config::LearningConfig;
use crate::layers::{EntryFilter, GovernanceLog};
use crate::models::{
    ClassificationResult, CorrectionPattern, Feedback, FeedbackRecord, FineTuneExample, LayerId,
    LayerWeights, LearningStats, RoutingResult, RoutingSummary, SharedLayerWeights,
    shared_weights, snapshot_weights,
};
use crate::{Error, Result, current_timestamp};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tracing::instrument;

use super::run_blocking;

/// Agent name on feedback governance entries.
pub const FEEDBACK_AGENT: &str = "feedback-learner";

/// Action name on feedback governance entries.
pub const FEEDBACK_ACTION: &str = "routing_feedback";

/// `type` tag on feedback governance entries.
pub const FEEDBACK_ENTRY_TYPE: &str = "feedback";

/// Records compared at each end of the history for accuracy improvement.
const IMPROVEMENT_WINDOW: usize = 10;

/// Number of correction patterns reported.
const TOP_CORRECTIONS: usize = 5;

/// Optional clamp applied to weights after every update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightBounds {
    /// Lower bound.
    pub min: Option<f64>,
    /// Upper bound.
    pub max: Option<f64>,
}

impl WeightBounds {
    /// No clamping.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Clamps to `[min, max]`.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Reads bounds from learning settings.
    #[must_use]
    pub const fn from_config(config: &LearningConfig) -> Self {
        Self {
            min: config.min_weight,
            max: config.max_weight,
        }
    }

    /// Applies the bounds to one weight.
    #[must_use]
    pub fn clamp(&self, weight: f64) -> f64 {
        let lower = self.min.map_or(weight, |min| weight.max(min));
        self.max.map_or(lower, |max| lower.min(max))
    }
}

/// Learns layer weights from user feedback.
pub struct FeedbackLearner {
    log: Arc<dyn GovernanceLog>,
    store: Arc<dyn WeightStore>,
    weights: SharedLayerWeights,
    writer: Mutex<()>,
    config: LearningConfig,
    bounds: WeightBounds,
}

impl FeedbackLearner {
    /// Creates a learner, loading the current weights from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if stored weights exist but cannot be read.
    pub fn new(
        log: Arc<dyn GovernanceLog>,
        store: Arc<dyn WeightStore>,
        config: LearningConfig,
    ) -> Result<Self> {
        let loaded = store.load()?;
        let bounds = WeightBounds::from_config(&config);
        Ok(Self {
            log,
            store,
            weights: shared_weights(loaded),
            writer: Mutex::new(()),
            config,
            bounds,
        })
    }

    /// Overrides the weight bounds.
    #[must_use]
    pub const fn with_bounds(mut self, bounds: WeightBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Shared handle to the live weights, for the classifier.
    #[must_use]
    pub fn weights(&self) -> SharedLayerWeights {
        Arc::clone(&self.weights)
    }

    /// Snapshot of the live weights.
    #[must_use]
    pub fn current_weights(&self) -> LayerWeights {
        snapshot_weights(&self.weights)
    }

    /// Records feedback for one routed query.
    ///
    /// # Errors
    ///
    /// Returns an error if the governance log rejects the record, or if the
    /// updated weights cannot be saved. In the latter case the record is
    /// already stored and the in-memory weights are already updated.
    pub async fn record_feedback(
        &self,
        query: &str,
        classification: &ClassificationResult,
        routing: &RoutingResult,
        feedback: Feedback,
    ) -> Result<FeedbackRecord> {
        self.record_feedback_with_context(query, classification, routing, feedback, BTreeMap::new())
            .await
    }

    /// Records feedback with caller-provided context attached to the record.
    ///
    /// # Errors
    ///
    /// See [`record_feedback`](Self::record_feedback).
    #[instrument(
        skip(self, query, classification, routing, feedback, context),
        fields(query_type = %classification.query_type, helpful = feedback.helpful)
    )]
    pub async fn record_feedback_with_context(
        &self,
        query: &str,
        classification: &ClassificationResult,
        routing: &RoutingResult,
        feedback: Feedback,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Result<FeedbackRecord> {
        let record = FeedbackRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: current_timestamp(),
            query: query.to_string(),
            classification: classification.clone(),
            routing: RoutingSummary::from(routing),
            feedback,
            context,
        };

        let payload = serde_json::to_value(&record).map_err(|e| Error::OperationFailed {
            operation: "serialize_feedback".to_string(),
            cause: e.to_string(),
        })?;
        let mut metadata = BTreeMap::new();
        metadata.insert("type".to_string(), FEEDBACK_ENTRY_TYPE.into());
        metadata.insert("record_id".to_string(), record.id.clone().into());
        metadata.insert("helpful".to_string(), record.feedback.helpful.into());
        metadata.insert(
            "query_type".to_string(),
            record.classification.query_type.as_str().into(),
        );

        self.log
            .append_entry(FEEDBACK_AGENT, FEEDBACK_ACTION, payload, metadata)
            .await?;

        let helpful = if record.feedback.helpful { "true" } else { "false" };
        metrics::counter!("strata_feedback_total", "helpful" => helpful).increment(1);

        if let Some(correct) = &record.feedback.correct_layers {
            self.apply_correction(&record.classification.layers, correct)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to persist layer weights"))?;
        }

        tracing::info!(record_id = %record.id, "Recorded feedback");
        Ok(record)
    }

    /// Boosts corrected layers, decays predicted-but-absent layers, and saves.
    async fn apply_correction(&self, predicted: &[LayerId], correct: &[LayerId]) -> Result<()> {
        let _guard = self.writer.lock().await;

        let snapshot = {
            let mut weights = self.weights.write().unwrap_or_else(PoisonError::into_inner);
            for layer in correct {
                let boosted = weights.scale(*layer, self.config.boost_factor);
                weights.set(*layer, self.bounds.clamp(boosted));
            }
            for layer in predicted.iter().filter(|l| !correct.contains(l)) {
                let decayed = weights.scale(*layer, self.config.decay_factor);
                weights.set(*layer, self.bounds.clamp(decayed));
            }
            weights.clone()
        };

        for (layer, weight) in snapshot.iter() {
            metrics::gauge!("strata_layer_weight", "layer" => layer.as_str()).set(weight);
        }
        tracing::debug!(
            boosted = correct.len(),
            "Updated layer weights"
        );
        let store = Arc::clone(&self.store);
        run_blocking("save_weights", move || store.save(&snapshot)).await
    }

    /// All feedback records in chronological order.
    ///
    /// Entries whose payload is not a feedback record are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the governance log cannot be read.
    pub async fn records(&self) -> Result<Vec<FeedbackRecord>> {
        let entries = self
            .log
            .read_entries(&EntryFilter::new().with_type(FEEDBACK_ENTRY_TYPE))
            .await?;

        let mut records: Vec<FeedbackRecord> = entries
            .into_iter()
            .filter_map(|entry| {
                serde_json::from_value(entry.result)
                    .inspect_err(|e| {
                        tracing::warn!(entry_id = %entry.id, error = %e, "Skipping malformed feedback entry");
                    })
                    .ok()
            })
            .collect();
        records.reverse();
        Ok(records)
    }

    /// Aggregate statistics over all feedback.
    ///
    /// # Errors
    ///
    /// Returns an error if the governance log cannot be read.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<LearningStats> {
        let records = self.records().await?;
        Ok(compute_stats(&records))
    }

    /// Writes all feedback as a JSON array of fine-tuning examples.
    ///
    /// Returns the number of examples written.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or the file cannot be written.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn export_for_fine_tuning(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let examples: Vec<FineTuneExample> =
            self.records().await?.iter().map(FineTuneExample::from).collect();

        let json = serde_json::to_string_pretty(&examples).map_err(|e| Error::OperationFailed {
            operation: "serialize_fine_tune_export".to_string(),
            cause: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::OperationFailed {
                    operation: "create_export_dir".to_string(),
                    cause: e.to_string(),
                })?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "write_fine_tune_export".to_string(),
                cause: e.to_string(),
            })?;

        tracing::info!(count = examples.len(), "Exported fine-tuning examples");
        Ok(examples.len())
    }
}

#[allow(clippy::cast_precision_loss)]
fn helpful_rate(records: &[FeedbackRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let helpful = records.iter().filter(|r| r.feedback.helpful).count();
    helpful as f64 / records.len() as f64 * 100.0
}

fn compute_stats(records: &[FeedbackRecord]) -> LearningStats {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for pattern in records.iter().filter_map(FeedbackRecord::correction_pattern) {
        *counts.entry(pattern).or_insert(0) += 1;
    }
    let mut common_corrections: Vec<CorrectionPattern> = counts
        .into_iter()
        .map(|(pattern, count)| CorrectionPattern { pattern, count })
        .collect();
    common_corrections.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pattern.cmp(&b.pattern)));
    common_corrections.truncate(TOP_CORRECTIONS);

    let accuracy_improvement = if records.len() >= 2 * IMPROVEMENT_WINDOW {
        let early = &records[..IMPROVEMENT_WINDOW];
        let recent = &records[records.len() - IMPROVEMENT_WINDOW..];
        helpful_rate(recent) - helpful_rate(early)
    } else {
        0.0
    };

    LearningStats {
        total_feedback: records.len(),
        helpful_rate: helpful_rate(records),
        common_corrections,
        accuracy_improvement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::InMemoryGovernanceLog;
    use crate::models::{DetectionSource, QueryType, RoutingStats};
    use tempfile::TempDir;

    fn classification(query_type: QueryType) -> ClassificationResult {
        ClassificationResult::from_policy("q", query_type, 0.8, "", DetectionSource::Keyword)
    }

    fn routing(classification: &ClassificationResult) -> RoutingResult {
        RoutingResult {
            query: "q".to_string(),
            classification: classification.clone(),
            results: Vec::new(),
            stats: RoutingStats::default(),
        }
    }

    fn learner(log: Arc<InMemoryGovernanceLog>) -> FeedbackLearner {
        FeedbackLearner::new(
            log,
            Arc::new(InMemoryWeightStore::new()),
            LearningConfig::default(),
        )
        .unwrap()
    }

    struct FailingStore;

    impl WeightStore for FailingStore {
        fn load(&self) -> Result<LayerWeights> {
            Ok(LayerWeights::default())
        }

        fn save(&self, _weights: &LayerWeights) -> Result<()> {
            Err(Error::OperationFailed {
                operation: "save".to_string(),
                cause: "read-only".to_string(),
            })
        }
    }

    /// Store whose save re-enters the runtime, which panics on an async worker.
    struct RuntimeBoundStore(InMemoryWeightStore);

    impl WeightStore for RuntimeBoundStore {
        fn load(&self) -> Result<LayerWeights> {
            self.0.load()
        }

        fn save(&self, weights: &LayerWeights) -> Result<()> {
            tokio::runtime::Handle::current().block_on(async { self.0.save(weights) })
        }
    }

    #[tokio::test]
    async fn test_weight_save_runs_on_blocking_pool() {
        let store = Arc::new(RuntimeBoundStore(InMemoryWeightStore::new()));
        let learner = FeedbackLearner::new(
            Arc::new(InMemoryGovernanceLog::new()),
            Arc::clone(&store) as Arc<dyn WeightStore>,
            LearningConfig::default(),
        )
        .unwrap();
        let c = classification(QueryType::Factual);
        let feedback = Feedback::unhelpful().with_correct_layers(vec![LayerId::Graph]);

        learner
            .record_feedback("q", &c, &routing(&c), feedback)
            .await
            .unwrap();
        assert!((store.load().unwrap().get(LayerId::Graph) - 1.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_record_appends_tagged_entry() {
        let log = Arc::new(InMemoryGovernanceLog::new());
        let learner = learner(Arc::clone(&log));
        let c = classification(QueryType::Factual);

        let record = learner
            .record_feedback("q", &c, &routing(&c), Feedback::helpful())
            .await
            .unwrap();

        let entries = log
            .read_entries(&EntryFilter::new().with_type(FEEDBACK_ENTRY_TYPE))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agent, FEEDBACK_AGENT);
        assert_eq!(entries[0].action, FEEDBACK_ACTION);
        assert_eq!(entries[0].result["id"], record.id.as_str());
    }

    #[tokio::test]
    async fn test_correction_boosts_and_decays() {
        let learner = learner(Arc::new(InMemoryGovernanceLog::new()));
        let c = classification(QueryType::Factual); // vector, graph
        let feedback = Feedback::unhelpful().with_correct_layers(vec![LayerId::Graph, LayerId::User]);

        learner
            .record_feedback("q", &c, &routing(&c), feedback)
            .await
            .unwrap();

        let weights = learner.current_weights();
        assert!((weights.get(LayerId::Graph) - 1.1).abs() < 1e-9);
        assert!((weights.get(LayerId::User) - 1.1).abs() < 1e-9);
        assert!((weights.get(LayerId::Vector) - 0.9).abs() < 1e-9);
        assert!((weights.get(LayerId::Session) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_correction_leaves_weights() {
        let learner = learner(Arc::new(InMemoryGovernanceLog::new()));
        let c = classification(QueryType::User);
        learner
            .record_feedback("q", &c, &routing(&c), Feedback::unhelpful())
            .await
            .unwrap();
        assert_eq!(learner.current_weights(), LayerWeights::default());
    }

    #[tokio::test]
    async fn test_bounds_clamp_updates() {
        let learner = learner(Arc::new(InMemoryGovernanceLog::new()))
            .with_bounds(WeightBounds::new(0.95, 1.05));
        let c = classification(QueryType::Factual);
        let feedback = Feedback::unhelpful().with_correct_layers(vec![LayerId::Graph]);
        learner
            .record_feedback("q", &c, &routing(&c), feedback)
            .await
            .unwrap();

        let weights = learner.current_weights();
        assert!((weights.get(LayerId::Graph) - 1.05).abs() < 1e-9);
        assert!((weights.get(LayerId::Vector) - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_save_failure_is_returned_after_append() {
        let log = Arc::new(InMemoryGovernanceLog::new());
        let learner = FeedbackLearner::new(
            Arc::clone(&log) as Arc<dyn GovernanceLog>,
            Arc::new(FailingStore),
            LearningConfig::default(),
        )
        .unwrap();
        let c = classification(QueryType::Factual);
        let feedback = Feedback::unhelpful().with_correct_layers(vec![LayerId::Graph]);

        let result = learner.record_feedback("q", &c, &routing(&c), feedback).await;
        assert!(result.is_err());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let learner = learner(Arc::new(InMemoryGovernanceLog::new()));
        let factual = classification(QueryType::Factual);
        for i in 0..20 {
            // First ten unhelpful, last ten helpful.
            let feedback = if i < 10 {
                Feedback::unhelpful().with_correct_type(QueryType::Architectural)
            } else {
                Feedback::helpful()
            };
            learner
                .record_feedback("q", &factual, &routing(&factual), feedback)
                .await
                .unwrap();
        }

        let stats = learner.stats().await.unwrap();
        assert_eq!(stats.total_feedback, 20);
        assert!((stats.helpful_rate - 50.0).abs() < 1e-9);
        assert!((stats.accuracy_improvement - 100.0).abs() < 1e-9);
        assert_eq!(stats.common_corrections.len(), 1);
        assert_eq!(
            stats.common_corrections[0].pattern,
            "classified FACTUAL as ARCHITECTURAL"
        );
        assert_eq!(stats.common_corrections[0].count, 10);
    }

    #[tokio::test]
    async fn test_stats_below_window_has_no_improvement() {
        let learner = learner(Arc::new(InMemoryGovernanceLog::new()));
        let c = classification(QueryType::User);
        for _ in 0..5 {
            learner
                .record_feedback("q", &c, &routing(&c), Feedback::helpful())
                .await
                .unwrap();
        }
        let stats = learner.stats().await.unwrap();
        assert!(stats.accuracy_improvement.abs() < f64::EPSILON);
        assert!((stats.helpful_rate - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_export_for_fine_tuning() {
        let dir = TempDir::new().unwrap();
        let learner = learner(Arc::new(InMemoryGovernanceLog::new()));
        let c = classification(QueryType::Procedural);
        learner
            .record_feedback("first", &c, &routing(&c), Feedback::helpful())
            .await
            .unwrap();
        learner
            .record_feedback("second", &c, &routing(&c), Feedback::unhelpful())
            .await
            .unwrap();

        let path = dir.path().join("out").join("fine_tune.json");
        assert_eq!(learner.export_for_fine_tuning(&path).await.unwrap(), 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        let examples: Vec<FineTuneExample> = serde_json::from_str(&raw).unwrap();
        assert_eq!(examples[0].query, "first");
        assert!(examples[0].helpful);
        assert_eq!(examples[1].predicted_type, QueryType::Procedural);
    }

    #[test]
    fn test_weight_bounds_clamp() {
        assert!((WeightBounds::unbounded().clamp(7.0) - 7.0).abs() < f64::EPSILON);
        let bounds = WeightBounds {
            min: Some(0.5),
            max: None,
        };
        assert!((bounds.clamp(0.1) - 0.5).abs() < f64::EPSILON);
    }
}
