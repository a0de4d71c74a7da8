//! Feedback learning integration tests.
//!
//! Routes real queries, records feedback against them, and checks that
//! learned weights persist across learner instances and reach the classifier.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use strata::config::{ClassifierConfig, LearningConfig};
use strata::layers::{GovernanceLayer, InMemoryGovernanceLog, StaticLayer};
use strata::models::{FineTuneExample, QueryType};
use strata::services::{FileWeightStore, WeightStore};
use strata::{Classifier, Feedback, FeedbackLearner, LayerId, MemoryLayer, Router};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn learner_in(dir: &TempDir, log: Arc<InMemoryGovernanceLog>) -> FeedbackLearner {
    FeedbackLearner::new(
        log,
        Arc::new(FileWeightStore::in_dir(dir.path())),
        LearningConfig::default(),
    )
    .unwrap()
}

fn factual_router(classifier: Arc<Classifier>) -> Router {
    Router::builder(classifier)
        .with_layer(Arc::new(StaticLayer::with_texts(
            LayerId::Vector,
            &["Tokens expire after one hour"],
        )))
        .with_layer(Arc::new(StaticLayer::with_texts(
            LayerId::Graph,
            &["auth depends on the token service"],
        )))
        .build()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// Weight learning
// ============================================================================

#[tokio::test]
async fn test_correction_persists_across_learners() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(InMemoryGovernanceLog::new());
    let learner = learner_in(&dir, Arc::clone(&log));

    let router = factual_router(Arc::new(Classifier::keyword_only(ClassifierConfig::default())));
    let routing = router.route("What is the token expiry?").await;
    assert_eq!(routing.classification.query_type, QueryType::Factual);

    learner
        .record_feedback(
            "What is the token expiry?",
            &routing.classification,
            &routing,
            Feedback::unhelpful().with_correct_layers(vec![LayerId::Graph, LayerId::Governance]),
        )
        .await
        .unwrap();

    let weights = learner.current_weights();
    assert!(approx(weights.get(LayerId::Graph), 1.1));
    assert!(approx(weights.get(LayerId::Governance), 1.1));
    assert!(approx(weights.get(LayerId::Vector), 0.9));
    assert!(approx(weights.get(LayerId::Session), 1.0));

    let store = FileWeightStore::in_dir(dir.path());
    assert!(store.path().exists());
    assert_eq!(store.load().unwrap(), weights);

    let reloaded = learner_in(&dir, log);
    assert_eq!(reloaded.current_weights(), weights);
}

#[tokio::test]
async fn test_learned_weights_reach_classifier() {
    let dir = TempDir::new().unwrap();
    let learner = learner_in(&dir, Arc::new(InMemoryGovernanceLog::new()));
    let classifier = Arc::new(
        Classifier::keyword_only(ClassifierConfig::default())
            .with_learned_weights(learner.weights()),
    );

    let before = classifier.classify("What is the token expiry?").await;
    assert!((before.weight(LayerId::Vector) - 0.6).abs() < 1e-6);

    learner
        .record_feedback(
            &before.query,
            &before,
            &factual_router(Arc::clone(&classifier)).route(&before.query).await,
            Feedback::helpful().with_correct_layers(vec![LayerId::Graph]),
        )
        .await
        .unwrap();

    let after = classifier.classify("What is the token expiry?").await;
    assert!((after.weight(LayerId::Vector) - 0.54).abs() < 1e-6);
    assert!((after.weight(LayerId::Graph) - 0.44).abs() < 1e-6);
    assert_eq!(after.layers, before.layers);
}

#[tokio::test]
async fn test_feedback_without_correction_keeps_file_absent() {
    let dir = TempDir::new().unwrap();
    let learner = learner_in(&dir, Arc::new(InMemoryGovernanceLog::new()));
    let router = factual_router(Arc::new(Classifier::keyword_only(ClassifierConfig::default())));
    let routing = router.route("Explain token refresh").await;

    learner
        .record_feedback("Explain token refresh", &routing.classification, &routing, Feedback::helpful())
        .await
        .unwrap();

    assert!(!FileWeightStore::in_dir(dir.path()).path().exists());
    assert_eq!(learner.records().await.unwrap().len(), 1);
}

// ============================================================================
// Governance log interplay
// ============================================================================

#[tokio::test]
async fn test_feedback_entries_are_hidden_from_governance_layer() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(InMemoryGovernanceLog::new());
    let learner = learner_in(&dir, Arc::clone(&log));
    let router = factual_router(Arc::new(Classifier::keyword_only(ClassifierConfig::default())));
    let routing = router.route("What is the token expiry?").await;

    learner
        .record_feedback(
            "What is the token expiry?",
            &routing.classification,
            &routing,
            Feedback::helpful().with_comment("token answer was right"),
        )
        .await
        .unwrap();
    assert_eq!(log.len(), 1);

    let layer = GovernanceLayer::new(log);
    assert!(layer.query("token expiry").await.unwrap().is_empty());
}

// ============================================================================
// Statistics and export
// ============================================================================

#[tokio::test]
async fn test_stats_and_export() {
    let dir = TempDir::new().unwrap();
    let learner = learner_in(&dir, Arc::new(InMemoryGovernanceLog::new()));
    let router = factual_router(Arc::new(Classifier::keyword_only(ClassifierConfig::default())));
    let routing = router.route("What is the token expiry?").await;

    for i in 0..20 {
        let feedback = if i < 10 {
            Feedback::unhelpful().with_correct_type(QueryType::Architectural)
        } else {
            Feedback::helpful()
        };
        learner
            .record_feedback("What is the token expiry?", &routing.classification, &routing, feedback)
            .await
            .unwrap();
    }

    let stats = learner.stats().await.unwrap();
    assert_eq!(stats.total_feedback, 20);
    assert!(approx(stats.helpful_rate, 50.0));
    assert!(approx(stats.accuracy_improvement, 100.0));
    assert_eq!(stats.common_corrections.len(), 1);
    assert_eq!(
        stats.common_corrections[0].pattern,
        "classified FACTUAL as ARCHITECTURAL"
    );
    assert_eq!(stats.common_corrections[0].count, 10);

    let export = dir.path().join("exports").join("fine_tune.json");
    assert_eq!(learner.export_for_fine_tuning(&export).await.unwrap(), 20);
    let examples: Vec<FineTuneExample> =
        serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(examples.len(), 20);
    assert!(!examples[0].helpful);
    assert!(examples[19].helpful);
    assert_eq!(examples[0].correct_type, Some(QueryType::Architectural));
}
