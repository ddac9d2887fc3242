use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;

use kb_discovery::{ConnectionDiscovery, DiscoveryError, DiscoveryScheduler, SchedulerOptions};
use kb_discovery_core::models::{
    Connection, ConnectionType, ConnectionUpdate, DiscoveredConnection, KnowledgeNode, NodeType,
};
use kb_discovery_core::store::memory::InMemoryStore;
use kb_discovery_core::store::{ConnectionStore, NodeStore};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn node(id: &str, node_type: NodeType, text: &str, minutes: i64) -> KnowledgeNode {
    let created_at = t0() + chrono::Duration::minutes(minutes);
    KnowledgeNode {
        id: id.to_string(),
        node_type,
        searchable_text: text.to_string(),
        created_at,
        modified_at: created_at,
    }
}

/// n1 and n2 share vocabulary and were created ten minutes apart; n3 and
/// n4 are unrelated to both and days away.
fn corpus() -> Vec<KnowledgeNode> {
    vec![
        node("n1", NodeType::Note, "rust async runtime executor", 0),
        node("n2", NodeType::Note, "rust async runtime scheduler", 10),
        node("n3", NodeType::Note, "gardening tomatoes compost soil", 5 * 24 * 60),
        node("n4", NodeType::Webpage, "baking sourdough bread starter", 10 * 24 * 60),
    ]
}

/// In-memory store that can hold lookups of one node until released, or
/// panic when one node is looked up.
struct ScriptedStore {
    inner: InMemoryStore,
    gated_id: Option<String>,
    gate: Semaphore,
    panic_id: Option<String>,
}

impl ScriptedStore {
    fn new(nodes: Vec<KnowledgeNode>) -> Self {
        Self {
            inner: InMemoryStore::with_nodes(nodes),
            gated_id: None,
            gate: Semaphore::new(0),
            panic_id: None,
        }
    }

    fn gate_on(mut self, id: &str) -> Self {
        self.gated_id = Some(id.to_string());
        self
    }

    fn panic_on(mut self, id: &str) -> Self {
        self.panic_id = Some(id.to_string());
        self
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl NodeStore for ScriptedStore {
    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<KnowledgeNode>> {
        if self.panic_id.as_deref() == Some(id) {
            panic!("store lookup failed for {}", id);
        }
        if self.gated_id.as_deref() == Some(id) {
            let _permit = self.gate.acquire().await?;
        }
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self) -> anyhow::Result<Vec<KnowledgeNode>> {
        self.inner.find_all().await
    }
}

#[async_trait]
impl ConnectionStore for ScriptedStore {
    async fn find_between_nodes(&self, a: &str, b: &str) -> anyhow::Result<Vec<Connection>> {
        self.inner.find_between_nodes(a, b).await
    }

    async fn create(&self, connection: &DiscoveredConnection) -> anyhow::Result<Connection> {
        self.inner.create(connection).await
    }

    async fn update(&self, id: &str, update: &ConnectionUpdate) -> anyhow::Result<Connection> {
        self.inner.update(id, update).await
    }

    async fn find_for_node(&self, node_id: &str) -> anyhow::Result<Vec<Connection>> {
        self.inner.find_for_node(node_id).await
    }

    async fn find_strong(
        &self,
        node_id: Option<&str>,
        threshold: f64,
    ) -> anyhow::Result<Vec<Connection>> {
        self.inner.find_strong(node_id, threshold).await
    }
}

fn setup() -> (Arc<InMemoryStore>, DiscoveryScheduler<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::with_nodes(corpus()));
    let scheduler = DiscoveryScheduler::new(Arc::clone(&store), SchedulerOptions::default());
    (store, scheduler)
}

#[tokio::test]
async fn test_analyze_persists_connections() {
    let (store, scheduler) = setup();

    let result = scheduler.analyze("n1").await.unwrap();
    assert_eq!(result.node_id, "n1");
    assert_eq!(result.connections_found, 1);

    let stored = store.all_connections();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].links("n1", "n2"));
    // Both signals fire; ten minutes apart outweighs the lexical overlap.
    assert_eq!(stored[0].connection_type, ConnectionType::Temporal);
    assert!(stored[0].confidence > 0.0 && stored[0].confidence < 0.7);
}

#[tokio::test]
async fn test_analyze_twice_hits_cache() {
    let (store, scheduler) = setup();

    let first = scheduler.analyze("n1").await.unwrap();
    let second = scheduler.analyze("n1").await.unwrap();

    assert_eq!(scheduler.analyses_run(), 1);
    assert_eq!(first.connections_found, second.connections_found);
    assert_eq!(store.connection_count(), 1);
    assert_eq!(scheduler.cache_stats().keys, vec!["n1".to_string()]);
}

#[tokio::test]
async fn test_cache_hit_repersists_connections() {
    let (store, scheduler) = setup();

    scheduler.analyze("n1").await.unwrap();
    store.clear_connections();
    assert_eq!(store.connection_count(), 0);

    scheduler.analyze("n1").await.unwrap();
    assert_eq!(scheduler.analyses_run(), 1);
    assert_eq!(store.connection_count(), 1);
}

#[tokio::test]
async fn test_reanalysis_does_not_duplicate() {
    let (store, scheduler) = setup();

    scheduler.analyze("n1").await.unwrap();
    scheduler.clear_cache();
    scheduler.analyze("n1").await.unwrap();
    // From the other side of the pair; same unordered pair.
    scheduler.analyze("n2").await.unwrap();

    assert_eq!(scheduler.analyses_run(), 3);
    assert_eq!(store.connection_count(), 1);
    let conn = &store.all_connections()[0];
    assert_eq!(conn.source_node_id, "n1");
    assert_eq!(conn.target_node_id, "n2");
}

#[tokio::test]
async fn test_missing_node_is_not_found() {
    let (store, scheduler) = setup();

    let err = scheduler.analyze("ghost").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NodeNotFound { ref node_id } if node_id == "ghost"));
    assert!(!err.is_retryable());
    assert_eq!(store.connection_count(), 0);
    assert_eq!(scheduler.cache_stats().size, 0);
}

#[tokio::test]
async fn test_isolated_node_has_no_connections() {
    let (store, scheduler) = setup();

    let result = scheduler.analyze("n4").await.unwrap();
    assert_eq!(result.connections_found, 0);
    assert_eq!(result.strong_connections, 0);
    assert_eq!(store.connection_count(), 0);
    // Empty results are still cached.
    assert_eq!(scheduler.cache_stats().size, 1);
}

#[tokio::test]
async fn test_enqueue_collapses_to_highest_priority() {
    let (_store, scheduler) = setup();

    // The drain task cannot run until this test yields.
    scheduler.enqueue("n1", 1);
    scheduler.enqueue("n3", 5);
    scheduler.enqueue("n1", 10);
    scheduler.enqueue("n3", 2);

    let jobs = scheduler.queued_jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].node_id, "n1");
    assert_eq!(jobs[0].priority, 10);
    assert_eq!(jobs[1].node_id, "n3");
    assert_eq!(jobs[1].priority, 5);
    assert!(scheduler.is_processing());

    scheduler.wait_idle().await;
    assert_eq!(scheduler.queue_size(), 0);
    assert!(!scheduler.is_processing());
    assert_eq!(scheduler.analyses_run(), 2);
}

#[tokio::test]
async fn test_drain_continues_past_failed_job() {
    let (store, scheduler) = setup();

    scheduler.enqueue("ghost", 100);
    scheduler.enqueue("n1", 0);
    scheduler.wait_idle().await;

    assert_eq!(scheduler.queue_size(), 0);
    assert_eq!(store.connection_count(), 1);
    assert_eq!(scheduler.cache_stats().keys, vec!["n1".to_string()]);
}

#[tokio::test]
async fn test_wait_idle_returns_immediately_when_idle() {
    let (_store, scheduler) = setup();
    tokio::time::timeout(Duration::from_secs(1), scheduler.wait_idle())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_node_updated_invalidates_cache() {
    let (store, scheduler) = setup();

    scheduler.analyze("n1").await.unwrap();
    assert_eq!(scheduler.analyses_run(), 1);

    let mut edited = node("n1", NodeType::Note, "rust async runtime executor tokio", 0);
    edited.modified_at = t0() + chrono::Duration::days(1);
    store.insert_node(edited);

    scheduler.on_node_updated("n1");
    assert!(scheduler.cache_stats().keys.is_empty());
    scheduler.wait_idle().await;

    assert_eq!(scheduler.analyses_run(), 2);
    assert_eq!(store.connection_count(), 1);
}

#[tokio::test]
async fn test_timeout_leaves_no_trace() {
    let mut nodes: Vec<KnowledgeNode> = (0..3000)
        .map(|i| {
            let text = format!(
                "entry{} topic{} shared vocabulary for lexical scoring item{} batch{}",
                i,
                i % 97,
                i * 7,
                i % 13
            );
            node(&format!("bulk-{}", i), NodeType::Note, &text, i as i64)
        })
        .collect();
    nodes.push(node("target", NodeType::Note, "shared vocabulary for lexical scoring", 0));

    let store = Arc::new(InMemoryStore::with_nodes(nodes));
    let options = SchedulerOptions {
        timeout: Duration::ZERO,
        ..SchedulerOptions::default()
    };
    let scheduler = DiscoveryScheduler::new(Arc::clone(&store), options);

    let err = scheduler.analyze("target").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Timeout { ref node_id, timeout_ms: 0 } if node_id == "target"));
    assert!(err.is_retryable());
    assert_eq!(scheduler.cache_stats().size, 0);
    assert_eq!(store.connection_count(), 0);
}

#[tokio::test]
async fn test_batch_analyze_skips_failures() {
    let (_store, scheduler) = setup();

    let ids = vec!["n1".to_string(), "ghost".to_string(), "n3".to_string()];
    let results = scheduler.batch_analyze(&ids).await;

    let analyzed: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
    assert_eq!(analyzed, vec!["n1", "n3"]);
}

#[tokio::test]
async fn test_facade_worker_status() {
    let store = Arc::new(InMemoryStore::with_nodes(corpus()));
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    let status = discovery.get_worker_status();
    assert!(!status.is_processing);
    assert_eq!(status.queue_size, 0);
    assert_eq!(status.cache_stats.size, 0);

    discovery.on_node_ingested("n1");
    discovery.analyze_node("n2");
    let status = discovery.get_worker_status();
    assert!(status.is_processing);
    assert_eq!(status.queue_size, 2);

    discovery.wait_idle().await;
    let status = discovery.get_worker_status();
    assert!(!status.is_processing);
    assert_eq!(status.queue_size, 0);
    assert_eq!(status.cache_stats.size, 2);
}

#[tokio::test]
async fn test_facade_sync_analysis_bypasses_queue() {
    let store = Arc::new(InMemoryStore::with_nodes(corpus()));
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    let result = discovery.analyze_node_sync("n2").await.unwrap();
    assert_eq!(result.connections_found, 1);
    assert!(!discovery.get_worker_status().is_processing);

    let conns = discovery.get_node_connections("n1").await.unwrap();
    assert_eq!(conns.len(), 1);
    assert_eq!(conns[0].source_node_id, "n2");
}

#[tokio::test]
async fn test_sync_analysis_runs_ahead_of_queued_work() {
    let store = Arc::new(ScriptedStore::new(corpus()).gate_on("n3"));
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    // Queued without yielding; the first job then blocks on its lookup.
    discovery.on_node_ingested("n3");
    discovery.analyze_node("n4");
    assert_eq!(discovery.get_worker_status().queue_size, 2);

    let result = discovery.analyze_node_sync("n1").await.unwrap();
    assert_eq!(result.node_id, "n1");
    assert_eq!(result.connections_found, 1);
    let conns = discovery.get_node_connections("n1").await.unwrap();
    assert_eq!(conns.len(), 1);
    assert!(conns[0].links("n1", "n2"));

    let status = discovery.get_worker_status();
    assert!(status.is_processing);
    assert!(status.queue_size > 0);
    assert!(!status.cache_stats.keys.contains(&"n4".to_string()));

    store.release();
    discovery.wait_idle().await;
    let status = discovery.get_worker_status();
    assert_eq!(status.queue_size, 0);
    assert_eq!(
        status.cache_stats.keys,
        vec!["n1".to_string(), "n3".to_string(), "n4".to_string()]
    );
}

#[tokio::test]
async fn test_panicking_job_does_not_wedge_scheduler() {
    let store = Arc::new(ScriptedStore::new(corpus()).panic_on("n3"));
    let scheduler = DiscoveryScheduler::new(Arc::clone(&store), SchedulerOptions::default());

    scheduler.enqueue("n3", 5);
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
        .await
        .expect("wait_idle did not return after the drain task panicked");
    assert!(!scheduler.is_processing());

    scheduler.enqueue("n1", 0);
    assert!(scheduler.is_processing());
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
        .await
        .expect("second drain loop did not finish");
    assert_eq!(scheduler.queue_size(), 0);
    assert_eq!(store.inner.connection_count(), 1);
}

#[tokio::test]
async fn test_facade_raw_scorers() {
    let store = Arc::new(InMemoryStore::with_nodes(corpus()));
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    let semantic = discovery.find_semantic_connections("n1", 0.3).await.unwrap();
    assert_eq!(semantic.len(), 1);
    assert_eq!(semantic[0].node_id, "n2");

    let temporal = discovery
        .find_temporal_connections("n1", chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(temporal.len(), 1);
    assert_eq!(temporal[0].node_id, "n2");
    assert_eq!(temporal[0].time_difference_ms, 10 * 60 * 1000);

    let err = discovery
        .find_semantic_connections("ghost", 0.3)
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::NodeNotFound { .. }));
}

#[tokio::test]
async fn test_facade_confidence_matches_analysis() {
    let store = Arc::new(InMemoryStore::with_nodes(corpus()));
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    let pair = discovery.calculate_confidence("n1", "n2").await.unwrap();
    let unrelated = discovery.calculate_confidence("n1", "n4").await.unwrap();
    assert!(pair > 0.0);
    assert_eq!(unrelated, 0.0);

    discovery.analyze_node_sync("n1").await.unwrap();
    let stored = discovery.get_node_connections("n1").await.unwrap();
    assert!((stored[0].confidence - pair).abs() < 1e-9);
}

#[tokio::test]
async fn test_facade_temporal_clusters() {
    let store = Arc::new(InMemoryStore::with_nodes(corpus()));
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    let clusters = discovery.find_temporal_clusters().await.unwrap();
    let ids: Vec<Vec<&str>> = clusters
        .iter()
        .map(|c| c.iter().map(|n| n.id.as_str()).collect())
        .collect();
    assert_eq!(ids, vec![vec!["n1", "n2"], vec!["n3"], vec!["n4"]]);
}

#[tokio::test]
async fn test_facade_strong_connections() {
    let nodes = vec![
        node("a", NodeType::Note, "distributed consensus raft leader election", 0),
        node("b", NodeType::Note, "distributed consensus raft leader election", 1),
        node("c", NodeType::Note, "pottery glaze kiln", 2 * 24 * 60),
    ];
    let store = Arc::new(InMemoryStore::with_nodes(nodes));
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    discovery.analyze_node_sync("a").await.unwrap();
    let strong = discovery.get_strong_connections(None).await.unwrap();
    assert_eq!(strong.len(), 1);
    assert!(strong[0].confidence > 0.7);

    let for_c = discovery.get_strong_connections(Some("c")).await.unwrap();
    assert!(for_c.is_empty());
}
