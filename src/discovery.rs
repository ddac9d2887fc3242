//! Connection discovery facade.
//!
//! [`ConnectionDiscovery`] is the entry point the ingestion pipeline and
//! any API layer call into. It composes a [`DiscoveryScheduler`] with the
//! store it writes to and adds direct scorer access for callers that want
//! raw signals without fusion or persistence.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`analyze_node`](ConnectionDiscovery::analyze_node) | Fire-and-forget enqueue |
//! | [`analyze_node_sync`](ConnectionDiscovery::analyze_node_sync) | Analyze now, bypassing the queue |
//! | [`find_semantic_connections`](ConnectionDiscovery::find_semantic_connections) | Raw lexical hits |
//! | [`find_temporal_connections`](ConnectionDiscovery::find_temporal_connections) | Raw temporal hits |
//! | [`calculate_confidence`](ConnectionDiscovery::calculate_confidence) | Fused score for one pair |
//! | [`get_node_connections`](ConnectionDiscovery::get_node_connections) | Stored connections for a node |
//! | [`get_strong_connections`](ConnectionDiscovery::get_strong_connections) | Stored connections with confidence > 0.7 |
//! | [`get_worker_status`](ConnectionDiscovery::get_worker_status) | Queue and cache introspection |

use std::sync::Arc;

use serde::Serialize;

use kb_discovery_core::fusion::{pairwise_confidence, STRONG_CONNECTION_THRESHOLD};
use kb_discovery_core::lexical::{self, SimilarityHit};
use kb_discovery_core::models::{Connection, KnowledgeNode};
use kb_discovery_core::store::{ConnectionStore, NodeStore};
use kb_discovery_core::temporal::{self, TemporalHit};

use crate::cache::CacheStats;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::scheduler::{AnalysisResult, DiscoveryScheduler, SchedulerOptions, DEFAULT_PRIORITY};

/// Snapshot of the scheduler's state.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub is_processing: bool,
    pub queue_size: usize,
    pub cache_stats: CacheStats,
}

pub struct ConnectionDiscovery<S> {
    scheduler: DiscoveryScheduler<S>,
}

impl<S> Clone for ConnectionDiscovery<S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<S> ConnectionDiscovery<S>
where
    S: NodeStore + ConnectionStore + 'static,
{
    pub fn new(store: Arc<S>, options: SchedulerOptions) -> Self {
        Self {
            scheduler: DiscoveryScheduler::new(store, options),
        }
    }

    pub fn scheduler(&self) -> &DiscoveryScheduler<S> {
        &self.scheduler
    }

    fn store(&self) -> &S {
        self.scheduler.store().as_ref()
    }

    async fn require_node(&self, node_id: &str) -> DiscoveryResult<KnowledgeNode> {
        self.store()
            .find_by_id(node_id)
            .await?
            .ok_or_else(|| DiscoveryError::NodeNotFound {
                node_id: node_id.to_string(),
            })
    }

    /// Queue `node_id` for background analysis.
    pub fn analyze_node(&self, node_id: &str) {
        self.scheduler.enqueue(node_id, DEFAULT_PRIORITY);
    }

    /// Analyze `node_id` immediately and return the summary.
    pub async fn analyze_node_sync(&self, node_id: &str) -> DiscoveryResult<AnalysisResult> {
        self.scheduler.analyze(node_id).await
    }

    /// Hook for the ingestion pipeline: analyze a new node soon.
    pub fn on_node_ingested(&self, node_id: &str) {
        self.scheduler.on_node_ingested(node_id);
    }

    /// Discard cached results for `node_id` and queue it again.
    pub fn reanalyze_node(&self, node_id: &str) {
        self.scheduler.on_node_updated(node_id);
    }

    pub async fn batch_analyze(&self, node_ids: &[String]) -> Vec<AnalysisResult> {
        self.scheduler.batch_analyze(node_ids).await
    }

    /// Lexical hits for `node_id` against the full corpus at `threshold`.
    pub async fn find_semantic_connections(
        &self,
        node_id: &str,
        threshold: f64,
    ) -> DiscoveryResult<Vec<SimilarityHit>> {
        let target = self.require_node(node_id).await?;
        let corpus = self.store().find_all().await?;
        Ok(lexical::find_similar(&target, &corpus, threshold))
    }

    /// Temporal hits for `node_id` within `window`.
    pub async fn find_temporal_connections(
        &self,
        node_id: &str,
        window: chrono::Duration,
    ) -> DiscoveryResult<Vec<TemporalHit>> {
        let target = self.require_node(node_id).await?;
        let corpus = self.store().find_all().await?;
        Ok(temporal::find_temporal_connections(&target, &corpus, window))
    }

    /// Fused confidence between two nodes, with the full corpus as IDF context.
    pub async fn calculate_confidence(&self, node_a: &str, node_b: &str) -> DiscoveryResult<f64> {
        let a = self.require_node(node_a).await?;
        let b = self.require_node(node_b).await?;
        let corpus = self.store().find_all().await?;
        Ok(pairwise_confidence(
            &a,
            &b,
            &corpus,
            &self.scheduler.options().params,
        ))
    }

    /// Group the whole corpus into temporal clusters using the configured window.
    pub async fn find_temporal_clusters(&self) -> DiscoveryResult<Vec<Vec<KnowledgeNode>>> {
        let corpus = self.store().find_all().await?;
        Ok(temporal::cluster_by_time(
            &corpus,
            self.scheduler.options().params.temporal_window,
        ))
    }

    pub async fn get_node_connections(&self, node_id: &str) -> DiscoveryResult<Vec<Connection>> {
        Ok(self.store().find_for_node(node_id).await?)
    }

    /// Stored connections with confidence strictly above 0.7.
    pub async fn get_strong_connections(
        &self,
        node_id: Option<&str>,
    ) -> DiscoveryResult<Vec<Connection>> {
        Ok(self
            .store()
            .find_strong(node_id, STRONG_CONNECTION_THRESHOLD)
            .await?)
    }

    pub fn get_worker_status(&self) -> WorkerStatus {
        WorkerStatus {
            is_processing: self.scheduler.is_processing(),
            queue_size: self.scheduler.queue_size(),
            cache_stats: self.scheduler.cache_stats(),
        }
    }

    pub fn clear_cache(&self) {
        self.scheduler.clear_cache();
    }

    /// Wait for queued work to finish.
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }
}
