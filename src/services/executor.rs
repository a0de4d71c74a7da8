//! Multi-hop execution of decomposed queries.
//!
//! Each hop classifies its sub-query, routes it with that classification, and
//! fuses the routing result. A hop is bounded by `hop_timeout_ms`; a hop that
//! times out, fails, or panics yields an empty context with zero relevance and
//! never fails the run.
//!
//! # Strategies
//!
//! | Strategy | Scheduling |
//! |----------|------------|
//! | `Parallel` | Every hop at once |
//! | `Sequential` | One hop at a time; each waits for its dependencies' completion signals |
//! | `Hybrid` | Topological levels in order, each level in batches of `max_concurrent_hops` |

use super::{Decomposer, FusionOptions, ResultFusion, Router};
use crate::config::ExecutorConfig;
use crate::elapsed_ms;
use crate::models::{
    DecompositionResult, ExecutionStrategy, HopResult, MultiHopResult, MultiHopStats, SubQuery,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tracing::{Instrument, instrument};

/// Everything a hop needs, shareable across spawned tasks.
struct HopRunner {
    router: Arc<Router>,
    fusion: ResultFusion,
    options: FusionOptions,
    timeout: Duration,
}

impl HopRunner {
    async fn run(&self, sub: &SubQuery) -> HopResult {
        let start = Instant::now();
        let work = async {
            let classification = self.router.classifier().classify(&sub.query).await;
            let routing = self
                .router
                .route_with_classification(&sub.query, classification.clone())
                .await;
            let fused = self.fusion.merge(&routing, &self.options);
            (classification, fused)
        };

        let hop = match tokio::time::timeout(self.timeout, work).await {
            Ok((classification, fused)) => HopResult {
                sub_query_id: sub.id.clone(),
                query: sub.query.clone(),
                classification: Some(classification),
                relevance: fused.mean_score(),
                context: fused.items,
                elapsed_ms: elapsed_ms(start),
                error: None,
            },
            Err(_) => {
                tracing::warn!(hop = %sub.id, timeout = ?self.timeout, "Hop timed out");
                HopResult::failed(sub, "Timeout", elapsed_ms(start))
            },
        };

        let status = if hop.is_success() { "success" } else { "timeout" };
        metrics::counter!("strata_hop_total", "status" => status).increment(1);
        #[allow(clippy::cast_precision_loss)]
        let elapsed = hop.elapsed_ms as f64;
        metrics::histogram!("strata_hop_duration_ms").record(elapsed);
        hop
    }
}

/// Spawns one hop, converting a panic into a failed hop.
async fn spawn_hop(runner: Arc<HopRunner>, sub: SubQuery) -> HopResult {
    let start = Instant::now();
    let span = tracing::debug_span!("hop", id = %sub.id);
    let task_sub = sub.clone();
    let handle = tokio::spawn(async move { runner.run(&task_sub).await }.instrument(span));
    match handle.await {
        Ok(hop) => hop,
        Err(e) => {
            tracing::warn!(hop = %sub.id, error = %e, "Hop task aborted");
            metrics::counter!("strata_hop_total", "status" => "aborted").increment(1);
            HopResult::failed(&sub, format!("Aborted: {e}"), elapsed_ms(start))
        },
    }
}

/// Executes decompositions hop by hop and combines the hop contexts.
pub struct MultiHopExecutor {
    runner: Arc<HopRunner>,
    decomposer: Arc<Decomposer>,
    config: ExecutorConfig,
}

impl MultiHopExecutor {
    /// Creates an executor with default settings and fusion options.
    #[must_use]
    pub fn new(router: Arc<Router>, decomposer: Arc<Decomposer>) -> Self {
        let config = ExecutorConfig::default();
        Self {
            runner: Arc::new(HopRunner {
                router,
                fusion: ResultFusion::new(),
                options: FusionOptions::default(),
                timeout: Duration::from_millis(config.hop_timeout_ms),
            }),
            decomposer,
            config,
        }
    }

    /// Sets the hop timeout and hybrid batch size.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.update_runner(|runner| runner.timeout = Duration::from_millis(config.hop_timeout_ms));
        self.config = config;
        self
    }

    /// Sets the fusion options used per hop and for the combined context.
    #[must_use]
    pub fn with_fusion_options(mut self, options: FusionOptions) -> Self {
        self.update_runner(|runner| runner.options = options);
        self
    }

    /// Replaces the fusion pass.
    #[must_use]
    pub fn with_fusion(mut self, fusion: ResultFusion) -> Self {
        self.update_runner(|runner| runner.fusion = fusion);
        self
    }

    fn update_runner(&mut self, f: impl FnOnce(&mut HopRunner)) {
        let runner = &self.runner;
        let mut updated = HopRunner {
            router: Arc::clone(&runner.router),
            fusion: runner.fusion.clone(),
            options: runner.options.clone(),
            timeout: runner.timeout,
        };
        f(&mut updated);
        self.runner = Arc::new(updated);
    }

    /// Decomposes `query`, executes the plan, and combines the contexts.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn run(&self, query: &str) -> MultiHopResult {
        let start = Instant::now();
        let decomposition = self.decomposer.decompose(query).await;
        let decomposition_ms = elapsed_ms(start);

        let mut result = self.execute(&decomposition).await;
        result.stats.decomposition_ms = decomposition_ms;
        result
    }

    /// Executes an existing decomposition.
    ///
    /// A decomposition that is not complex, or has no sub-queries, runs the
    /// original query as a single hop.
    #[instrument(
        skip(self, decomposition),
        fields(strategy = %decomposition.strategy, sub_queries = decomposition.sub_queries.len())
    )]
    pub async fn execute(&self, decomposition: &DecompositionResult) -> MultiHopResult {
        let exec_start = Instant::now();

        let hops = if !decomposition.is_complex || decomposition.sub_queries.is_empty() {
            let single = SubQuery::new("q1", decomposition.query.clone());
            vec![spawn_hop(Arc::clone(&self.runner), single).await]
        } else {
            let subs = &decomposition.sub_queries;
            let mut by_id = match decomposition.strategy {
                ExecutionStrategy::Parallel => self.execute_parallel(subs).await,
                ExecutionStrategy::Sequential => self.execute_sequential(subs).await,
                ExecutionStrategy::Hybrid => self.execute_hybrid(subs).await,
            };
            subs.iter()
                .map(|sub| {
                    by_id
                        .remove(&sub.id)
                        .unwrap_or_else(|| HopResult::failed(sub, "Not executed", 0))
                })
                .collect()
        };
        let execution_ms = elapsed_ms(exec_start);

        let combine_start = Instant::now();
        let context = self
            .runner
            .fusion
            .merge_hops(&decomposition.query, &hops, &self.runner.options);
        let combination_ms = elapsed_ms(combine_start);

        #[allow(clippy::cast_precision_loss)]
        let avg_results_per_hop = if hops.is_empty() {
            0.0
        } else {
            hops.iter().map(|h| h.context.len()).sum::<usize>() as f32 / hops.len() as f32
        };
        #[allow(clippy::cast_precision_loss)]
        let dedup_rate = if context.stats.total_items == 0 {
            0.0
        } else {
            1.0 - context.stats.after_dedup as f32 / context.stats.total_items as f32
        };

        let stats = MultiHopStats {
            hop_count: hops.len(),
            decomposition_ms: 0,
            execution_ms,
            combination_ms,
            avg_results_per_hop,
            dedup_rate,
            estimated_tokens: context.stats.estimated_tokens,
        };
        tracing::debug!(
            hops = stats.hop_count,
            execution_ms,
            tokens = stats.estimated_tokens,
            "Multi-hop execution complete"
        );

        MultiHopResult {
            decomposition: decomposition.clone(),
            hops,
            context,
            stats,
        }
    }

    async fn execute_parallel(&self, subs: &[SubQuery]) -> HashMap<String, HopResult> {
        join_all(
            subs.iter()
                .map(|sub| spawn_hop(Arc::clone(&self.runner), sub.clone())),
        )
        .await
        .into_iter()
        .map(|hop| (hop.sub_query_id.clone(), hop))
        .collect()
    }

    /// One hop at a time, in dependency order, highest priority first.
    async fn execute_sequential(&self, subs: &[SubQuery]) -> HashMap<String, HopResult> {
        let mut deps = dependency_indices(subs);
        let dropped = drop_back_edges(&mut deps);
        if dropped > 0 {
            tracing::warn!(dropped, "Dropped cyclic dependencies");
        }

        let mut senders = Vec::with_capacity(subs.len());
        let mut receivers = Vec::with_capacity(subs.len());
        for _ in subs {
            let (tx, rx) = watch::channel(false);
            senders.push(Some(tx));
            receivers.push(rx);
        }

        let mut order: Vec<usize> = (0..subs.len()).collect();
        order.sort_by(|&a, &b| subs[b].priority.cmp(&subs[a].priority));

        let permit = Arc::new(Semaphore::new(1));
        let mut handles = Vec::with_capacity(subs.len());
        for i in order {
            let sub = subs[i].clone();
            let waits: Vec<watch::Receiver<bool>> =
                deps[i].iter().map(|&d| receivers[d].clone()).collect();
            let done = senders[i].take();
            let runner = Arc::clone(&self.runner);
            let permit = Arc::clone(&permit);
            let task_sub = sub.clone();
            let span = tracing::debug_span!("hop", id = %sub.id);

            let handle = tokio::spawn(
                async move {
                    for mut rx in waits {
                        // A closed channel means the dependency's task is gone.
                        let _ = rx.wait_for(|finished| *finished).await;
                    }
                    let _permit = permit.acquire_owned().await.ok();
                    let hop = runner.run(&task_sub).await;
                    if let Some(tx) = done {
                        tx.send_replace(true);
                    }
                    hop
                }
                .instrument(span),
            );
            handles.push((sub, handle));
        }

        let mut results = HashMap::with_capacity(handles.len());
        for (sub, handle) in handles {
            let hop = handle.await.unwrap_or_else(|e| {
                tracing::warn!(hop = %sub.id, error = %e, "Hop task aborted");
                HopResult::failed(&sub, format!("Aborted: {e}"), 0)
            });
            results.insert(sub.id.clone(), hop);
        }
        results
    }

    /// Dependency levels in order; each level in bounded concurrent batches.
    async fn execute_hybrid(&self, subs: &[SubQuery]) -> HashMap<String, HopResult> {
        let deps = dependency_indices(subs);
        let (mut levels, cyclic) = topological_levels(&deps);
        if !cyclic.is_empty() {
            tracing::warn!(count = cyclic.len(), "Running cyclic sub-queries in a final level");
            levels.push(cyclic);
        }

        let batch_size = self.config.max_concurrent_hops.max(1);
        let mut results = HashMap::with_capacity(subs.len());
        for (depth, level) in levels.iter().enumerate() {
            tracing::debug!(depth, size = level.len(), "Executing level");
            for batch in level.chunks(batch_size) {
                let hops = join_all(
                    batch
                        .iter()
                        .map(|&i| spawn_hop(Arc::clone(&self.runner), subs[i].clone())),
                )
                .await;
                results.extend(hops.into_iter().map(|hop| (hop.sub_query_id.clone(), hop)));
            }
        }
        results
    }
}

/// Dependency indices per sub-query, ignoring unknown ids and self-references.
fn dependency_indices(subs: &[SubQuery]) -> Vec<Vec<usize>> {
    let index: HashMap<&str, usize> = subs
        .iter()
        .enumerate()
        .map(|(i, q)| (q.id.as_str(), i))
        .collect();

    subs.iter()
        .enumerate()
        .map(|(i, q)| {
            let mut deps: Vec<usize> = q
                .dependencies
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .filter(|&d| d != i)
                .collect();
            deps.sort_unstable();
            deps.dedup();
            deps
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Removes edges that close a cycle, returning how many were dropped.
fn drop_back_edges(deps: &mut [Vec<usize>]) -> usize {
    fn visit(node: usize, deps: &mut [Vec<usize>], marks: &mut [Mark], dropped: &mut usize) {
        marks[node] = Mark::Active;
        let mut kept = Vec::new();
        for dep in std::mem::take(&mut deps[node]) {
            match marks[dep] {
                Mark::Active => *dropped += 1,
                Mark::Unvisited => {
                    visit(dep, deps, marks, dropped);
                    kept.push(dep);
                },
                Mark::Done => kept.push(dep),
            }
        }
        deps[node] = kept;
        marks[node] = Mark::Done;
    }

    let mut marks = vec![Mark::Unvisited; deps.len()];
    let mut dropped = 0;
    for node in 0..deps.len() {
        if marks[node] == Mark::Unvisited {
            visit(node, deps, &mut marks, &mut dropped);
        }
    }
    dropped
}

/// Groups nodes into levels where every dependency sits in an earlier level.
///
/// Returns the levels and the nodes that could not be placed because they sit
/// on or behind a cycle.
fn topological_levels(deps: &[Vec<usize>]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut placed = vec![false; deps.len()];
    let mut remaining: Vec<usize> = (0..deps.len()).collect();
    let mut levels = Vec::new();

    loop {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| deps[i].iter().all(|&d| placed[d]))
            .collect();
        if ready.is_empty() {
            break;
        }
        for &i in &ready {
            placed[i] = true;
        }
        remaining.retain(|&i| !placed[i]);
        levels.push(ready);
    }
    (levels, remaining)
}
