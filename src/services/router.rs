//! Concurrent fan-out over memory layers.
//!
//! One task per target layer, each raced against the layer timeout. A layer
//! that fails, times out, panics or is missing yields an error entry in its
//! own [`LayerResult`]; siblings are never cancelled or delayed. Results are
//! reassembled in classification order regardless of completion order.

use super::Classifier;
use super::cache::QueryCache;
use crate::config::RouterConfig;
use crate::elapsed_ms;
use crate::layers::MemoryLayer;
use crate::models::{
    ClassificationResult, LayerError, LayerId, LayerItem, LayerResult, RoutingResult,
    RoutingStats,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{Instrument, instrument};

type LayerOutcome = (Result<Vec<LayerItem>, LayerError>, u64);

/// Routes queries to memory layers.
pub struct Router {
    classifier: Arc<Classifier>,
    layers: HashMap<LayerId, Arc<dyn MemoryLayer>>,
    config: RouterConfig,
    cache: Option<QueryCache>,
}

/// Builder for [`Router`].
pub struct RouterBuilder {
    classifier: Arc<Classifier>,
    layers: HashMap<LayerId, Arc<dyn MemoryLayer>>,
    config: RouterConfig,
}

impl RouterBuilder {
    /// Registers a layer collaborator, replacing any previous one for the same id.
    #[must_use]
    pub fn with_layer(mut self, layer: Arc<dyn MemoryLayer>) -> Self {
        self.layers.insert(layer.id(), layer);
        self
    }

    /// Registers several layer collaborators.
    #[must_use]
    pub fn with_layers(mut self, layers: impl IntoIterator<Item = Arc<dyn MemoryLayer>>) -> Self {
        for layer in layers {
            self.layers.insert(layer.id(), layer);
        }
        self
    }

    /// Sets the router configuration.
    #[must_use]
    pub const fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the router.
    #[must_use]
    pub fn build(self) -> Router {
        let cache = self.config.cache_enabled.then(|| {
            QueryCache::new(
                self.config.cache_capacity,
                self.config.cache_ttl_secs.map(Duration::from_secs),
            )
        });
        Router {
            classifier: self.classifier,
            layers: self.layers,
            config: self.config,
            cache,
        }
    }
}

impl Router {
    /// Starts building a router around `classifier`.
    #[must_use]
    pub fn builder(classifier: Arc<Classifier>) -> RouterBuilder {
        RouterBuilder {
            classifier,
            layers: HashMap::new(),
            config: RouterConfig::default(),
        }
    }

    /// The classifier used by [`route`](Self::route).
    #[must_use]
    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    /// Ids of the registered layers.
    #[must_use]
    pub fn registered_layers(&self) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = self.layers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Classifies and routes `query`, serving repeats from the cache.
    ///
    /// A cache hit performs neither classification nor layer calls. A result
    /// in which every queried layer failed is not cached, so the next identical
    /// query is routed again and reports `cache_hit == false`.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn route(&self, query: &str) -> RoutingResult {
        if let Some(cache) = &self.cache {
            if let Some(mut cached) = cache.get(query) {
                cached.stats.cache_hit = true;
                metrics::counter!("strata_route_total", "cache" => "hit").increment(1);
                tracing::debug!("Routing cache hit");
                return cached;
            }
        }

        let classification = self.classifier.classify(query).await;
        let result = self.fan_out(query, classification).await;

        if let Some(cache) = &self.cache {
            if result.stats.layers_queried > 0 && result.stats.succeeded == 0 {
                tracing::debug!("Not caching result where every layer failed");
            } else {
                cache.insert(query, result.clone());
            }
        }
        metrics::counter!("strata_route_total", "cache" => "miss").increment(1);
        result
    }

    /// Routes `query` using a precomputed classification, bypassing the cache.
    #[instrument(skip(self, query, classification), fields(query_type = %classification.query_type))]
    pub async fn route_with_classification(
        &self,
        query: &str,
        classification: ClassificationResult,
    ) -> RoutingResult {
        metrics::counter!("strata_route_total", "cache" => "bypass").increment(1);
        self.fan_out(query, classification).await
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Number of cached queries (0 when caching is disabled).
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, QueryCache::len)
    }

    async fn fan_out(&self, query: &str, classification: ClassificationResult) -> RoutingResult {
        let start = Instant::now();
        let timeout = Duration::from_millis(self.config.layer_timeout_ms);

        let pending: Vec<(LayerId, f32, Option<JoinHandle<LayerOutcome>>)> = classification
            .layers
            .iter()
            .map(|&id| {
                let weight = classification.weight(id);
                let handle = self
                    .layers
                    .get(&id)
                    .map(|layer| Self::spawn_layer_query(Arc::clone(layer), query, timeout));
                (id, weight, handle)
            })
            .collect();

        let results: Vec<LayerResult> =
            futures::future::join_all(pending.into_iter().map(|(layer, weight, handle)| async move {
                let (outcome, elapsed_ms) = match handle {
                    None => (Err(LayerError::NotRegistered), 0),
                    Some(handle) => handle
                        .await
                        .unwrap_or_else(|e| (Err(LayerError::Aborted(e.to_string())), 0)),
                };
                Self::record_layer_metrics(layer, &outcome, elapsed_ms);
                LayerResult {
                    layer,
                    outcome,
                    weight,
                    elapsed_ms,
                }
            }))
            .await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let stats = RoutingStats {
            total_time_ms: elapsed_ms(start),
            layers_queried: results.len(),
            cache_hit: false,
            succeeded,
            failed: results.len() - succeeded,
        };

        if stats.failed > 0 {
            tracing::warn!(
                failed = stats.failed,
                layers = stats.layers_queried,
                "Some layers did not answer"
            );
        }
        tracing::debug!(
            layers = stats.layers_queried,
            succeeded = stats.succeeded,
            total_time_ms = stats.total_time_ms,
            "Routed query"
        );

        RoutingResult {
            query: query.to_string(),
            classification,
            results,
            stats,
        }
    }

    fn spawn_layer_query(
        layer: Arc<dyn MemoryLayer>,
        query: &str,
        timeout: Duration,
    ) -> JoinHandle<LayerOutcome> {
        let text = query.to_string();
        let span = tracing::debug_span!("layer_query", layer = %layer.id());
        tokio::spawn(
            async move {
                let start = Instant::now();
                let outcome = match tokio::time::timeout(timeout, layer.query(&text)).await {
                    Ok(Ok(items)) => Ok(items),
                    Ok(Err(e)) => Err(LayerError::Failed(e.to_string())),
                    Err(_) => Err(LayerError::Timeout),
                };
                (outcome, elapsed_ms(start))
            }
            .instrument(span),
        )
    }

    fn record_layer_metrics(
        layer: LayerId,
        outcome: &Result<Vec<LayerItem>, LayerError>,
        elapsed_ms: u64,
    ) {
        let status = match outcome {
            Ok(_) => "success",
            Err(LayerError::Timeout) => "timeout",
            Err(LayerError::Failed(_)) => "error",
            Err(LayerError::NotRegistered) => "not_registered",
            Err(LayerError::Aborted(_)) => "aborted",
        };
        metrics::counter!(
            "strata_layer_query_total",
            "layer" => layer.as_str(),
            "status" => status
        )
        .increment(1);
        #[allow(clippy::cast_precision_loss)]
        let elapsed = elapsed_ms as f64;
        metrics::histogram!("strata_layer_query_duration_ms", "layer" => layer.as_str())
            .record(elapsed);
        if let Err(e) = outcome {
            tracing::debug!(layer = %layer, error = %e, "Layer query failed");
        }
    }
}
