//! Discovery scheduler: priority queue, single drain loop, result cache,
//! and timeout-bounded analysis.
//!
//! # Lifecycle
//!
//! ```text
//!            enqueue()                 queue empty
//!   idle ──────────────▶ draining ─────────────────▶ idle
//!                          │  ▲
//!                          └──┘ pop highest-priority job, analyze()
//! ```
//!
//! At most one drain loop runs per scheduler. [`DiscoveryScheduler::enqueue`]
//! while draining only adds to (or reorders) the queue. The `draining` flag
//! lives under the same lock as the queue, so a job can never be left
//! behind by a loop that is just exiting.
//!
//! [`DiscoveryScheduler::analyze`] can also be called directly; such calls
//! bypass the queue and may run alongside or ahead of queued work.
//!
//! # Timeouts
//!
//! The fusion pass is CPU-bound, so it runs on the blocking pool with a
//! shared cancel flag and is raced against `tokio::time::timeout`. When the
//! timer wins the flag is set, the caller gets [`DiscoveryError::Timeout`],
//! and the pass stops at its next comparison. Nothing is cached or
//! persisted for a timed-out attempt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use kb_discovery_core::fusion::{
    discover_connections_cancellable, is_strong_connection, DiscoveryParams,
};
use kb_discovery_core::models::{DiscoveredConnection, KnowledgeNode};
use kb_discovery_core::store::{ConnectionStore, NodeStore};
use kb_discovery_core::upsert::persist_connections;

use crate::cache::{CacheStats, ResultCache, DEFAULT_CACHE_TTL};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::queue::{AnalysisJob, JobQueue};

/// Priority used by fire-and-forget analysis requests.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub params: DiscoveryParams,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub ingest_priority: i32,
    pub update_priority: i32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            params: DiscoveryParams::default(),
            timeout: Duration::from_millis(5000),
            cache_ttl: DEFAULT_CACHE_TTL,
            ingest_priority: 10,
            update_priority: 5,
        }
    }
}

impl From<&DiscoveryConfig> for SchedulerOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            params: config.params(),
            timeout: config.timeout(),
            cache_ttl: config.cache_ttl(),
            ingest_priority: config.ingest_priority,
            update_priority: config.update_priority,
        }
    }
}

/// Summary of one completed analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub node_id: String,
    pub connections_found: usize,
    pub strong_connections: usize,
    pub processing_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    fn summarize(node_id: &str, connections: &[DiscoveredConnection], started: Instant) -> Self {
        Self {
            node_id: node_id.to_string(),
            connections_found: connections.len(),
            strong_connections: connections
                .iter()
                .filter(|c| is_strong_connection(c.confidence))
                .count(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        }
    }
}

struct QueueState {
    queue: JobQueue,
    draining: bool,
}

struct Inner<S> {
    store: Arc<S>,
    options: SchedulerOptions,
    state: Mutex<QueueState>,
    cache: Mutex<ResultCache>,
    idle: Notify,
    analyses_run: AtomicU64,
}

/// Clears `draining` and wakes `wait_idle` callers when a drain loop ends,
/// including by panic. Jobs still queued after a panic wait for the next
/// `enqueue` to start a new loop.
struct DrainGuard<'a, S> {
    inner: &'a Inner<S>,
    finished: bool,
}

impl<S> Drop for DrainGuard<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.draining = false;
            warn!(queue_size = state.queue.len(), "drain loop aborted");
        }
        self.inner.idle.notify_waiters();
    }
}

/// Cloneable handle to a scheduler. All clones share one queue and cache.
pub struct DiscoveryScheduler<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for DiscoveryScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> DiscoveryScheduler<S>
where
    S: NodeStore + ConnectionStore + 'static,
{
    pub fn new(store: Arc<S>, options: SchedulerOptions) -> Self {
        let cache = ResultCache::new(options.cache_ttl);
        Self {
            inner: Arc::new(Inner {
                store,
                options,
                state: Mutex::new(QueueState {
                    queue: JobQueue::new(),
                    draining: false,
                }),
                cache: Mutex::new(cache),
                idle: Notify::new(),
                analyses_run: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.inner.options
    }

    /// Queue `node_id` for analysis and start draining if idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, node_id: &str, priority: i32) {
        let start_drain = {
            let mut state = self.inner.state.lock().unwrap();
            let added = state.queue.push(node_id, priority);
            debug!(node_id, priority, added, queue_size = state.queue.len(), "enqueued");
            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };

        if start_drain {
            let this = self.clone();
            tokio::spawn(async move { this.drain().await });
        }
    }

    /// Enqueue a freshly ingested node at ingest priority.
    pub fn on_node_ingested(&self, node_id: &str) {
        self.enqueue(node_id, self.inner.options.ingest_priority);
    }

    /// Drop any cached result for `node_id` and enqueue it at update priority.
    pub fn on_node_updated(&self, node_id: &str) {
        self.invalidate(node_id);
        self.enqueue(node_id, self.inner.options.update_priority);
    }

    async fn drain(&self) {
        let mut guard = DrainGuard {
            inner: &self.inner,
            finished: false,
        };
        loop {
            let job = {
                let mut state = self.inner.state.lock().unwrap();
                match state.queue.pop() {
                    Some(job) => job,
                    None => {
                        state.draining = false;
                        guard.finished = true;
                        break;
                    }
                }
            };

            match self.analyze(&job.node_id).await {
                Ok(result) => info!(
                    node_id = %result.node_id,
                    connections = result.connections_found,
                    strong = result.strong_connections,
                    elapsed_ms = result.processing_time_ms,
                    "analysis complete"
                ),
                Err(e) => warn!(node_id = %job.node_id, error = %e, "analysis job failed"),
            }
        }
    }

    /// Analyze one node now, using the cache when fresh.
    ///
    /// A cache hit re-persists the cached connections (the store may have
    /// been cleared) without recomputing.
    pub async fn analyze(&self, node_id: &str) -> DiscoveryResult<AnalysisResult> {
        let started = Instant::now();

        let cached = self.inner.cache.lock().unwrap().get(node_id);
        if let Some(connections) = cached {
            debug!(node_id, "cache hit");
            persist_connections(self.inner.store.as_ref(), &connections).await?;
            return Ok(AnalysisResult::summarize(node_id, &connections, started));
        }

        let target = self
            .inner
            .store
            .find_by_id(node_id)
            .await?
            .ok_or_else(|| DiscoveryError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
        let corpus = self.inner.store.find_all().await?;

        let connections = self.run_fusion(target, corpus).await?;

        persist_connections(self.inner.store.as_ref(), &connections).await?;
        self.inner
            .cache
            .lock()
            .unwrap()
            .insert(node_id, connections.clone());

        Ok(AnalysisResult::summarize(node_id, &connections, started))
    }

    async fn run_fusion(
        &self,
        target: KnowledgeNode,
        corpus: Vec<KnowledgeNode>,
    ) -> DiscoveryResult<Vec<DiscoveredConnection>> {
        let node_id = target.id.clone();
        let params = self.inner.options.params.clone();
        let timeout = self.inner.options.timeout;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        self.inner.analyses_run.fetch_add(1, Ordering::Relaxed);
        let task = tokio::task::spawn_blocking(move || {
            discover_connections_cancellable(&target, &corpus, &params, &flag)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Some(connections))) => Ok(connections),
            Ok(Ok(None)) => Err(DiscoveryError::Worker(format!(
                "analysis of {} was cancelled",
                node_id
            ))),
            Ok(Err(join_err)) => Err(DiscoveryError::Worker(join_err.to_string())),
            Err(_) => {
                cancelled.store(true, Ordering::Relaxed);
                Err(DiscoveryError::Timeout {
                    node_id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Analyze each node in order, skipping (and logging) failures.
    pub async fn batch_analyze(&self, node_ids: &[String]) -> Vec<AnalysisResult> {
        let mut results = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            match self.analyze(node_id).await {
                Ok(result) => results.push(result),
                Err(e) => warn!(node_id = %node_id, error = %e, "batch analysis skipped node"),
            }
        }
        results
    }

    /// Resolve once the queue is empty and no drain loop is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_processing() {
                return;
            }
            notified.await;
        }
    }

    pub fn queue_size(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    /// Whether a drain loop is active.
    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().unwrap().draining
    }

    pub fn queued_jobs(&self) -> Vec<AnalysisJob> {
        self.inner.state.lock().unwrap().queue.snapshot()
    }

    pub fn invalidate(&self, node_id: &str) -> bool {
        self.inner.cache.lock().unwrap().invalidate(node_id)
    }

    pub fn clear_cache(&self) {
        self.inner.cache.lock().unwrap().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.lock().unwrap().stats()
    }

    /// Number of fusion passes started (cache hits excluded).
    pub fn analyses_run(&self) -> u64 {
        self.inner.analyses_run.load(Ordering::Relaxed)
    }
}
