//! SQLite store behavior through the same traits the scheduler uses.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use kb_discovery::config::Config;
use kb_discovery::sqlite_store::SqliteStore;
use kb_discovery::{db, migrate, ConnectionDiscovery, SchedulerOptions};
use kb_discovery_core::models::{
    ConnectionType, ConnectionUpdate, DiscoveredConnection, KnowledgeNode, NodeType,
};
use kb_discovery_core::store::{ConnectionStore, NodeStore};
use kb_discovery_core::upsert::upsert_connection;

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config = Config::with_db_path(tmp.path().join("data/kb.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn node(id: &str, text: &str, minutes: i64) -> KnowledgeNode {
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        + chrono::Duration::minutes(minutes);
    KnowledgeNode {
        id: id.to_string(),
        node_type: NodeType::Note,
        searchable_text: text.to_string(),
        created_at,
        modified_at: created_at,
    }
}

fn discovered(source: &str, target: &str, confidence: f64) -> DiscoveredConnection {
    DiscoveredConnection {
        source_node_id: source.to_string(),
        target_node_id: target.to_string(),
        connection_type: ConnectionType::Semantic,
        confidence,
        reason: format!("test {:.1}", confidence),
    }
}

#[tokio::test]
async fn test_migrations_idempotent() {
    let (_tmp, store) = open_store().await;
    migrate::run_migrations(store.pool()).await.unwrap();
    migrate::run_migrations(store.pool()).await.unwrap();
    assert!(store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_node_roundtrip_and_upsert() {
    let (_tmp, store) = open_store().await;

    let original = node("n1", "first draft", 0);
    store.upsert_node(&original).await.unwrap();
    assert_eq!(store.find_by_id("n1").await.unwrap(), Some(original));

    let mut edited = node("n1", "second draft", 0);
    edited.node_type = NodeType::Webpage;
    store.upsert_node(&edited).await.unwrap();

    let all = store.find_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].searchable_text, "second draft");
    assert_eq!(all[0].node_type, NodeType::Webpage);
    assert!(store.find_by_id("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_all_ordered_by_creation() {
    let (_tmp, store) = open_store().await;
    store.upsert_node(&node("late", "x", 30)).await.unwrap();
    store.upsert_node(&node("early", "x", 0)).await.unwrap();
    store.upsert_node(&node("mid", "x", 10)).await.unwrap();

    let ids: Vec<String> = store
        .find_all()
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec!["early", "mid", "late"]);
}

#[tokio::test]
async fn test_upsert_keeps_more_confident_record() {
    let (_tmp, store) = open_store().await;

    upsert_connection(&store, &discovered("a", "b", 0.6)).await.unwrap();
    upsert_connection(&store, &discovered("b", "a", 0.8)).await.unwrap();
    upsert_connection(&store, &discovered("a", "b", 0.5)).await.unwrap();

    let conns = store.find_between_nodes("b", "a").await.unwrap();
    assert_eq!(conns.len(), 1);
    assert_eq!(conns[0].source_node_id, "a");
    assert!((conns[0].confidence - 0.8).abs() < 1e-12);
    assert_eq!(conns[0].metadata.reason, "test 0.8");
}

#[tokio::test]
async fn test_update_missing_connection_fails() {
    let (_tmp, store) = open_store().await;
    let update = ConnectionUpdate {
        confidence: Some(0.9),
        reason: None,
        discovered_at: None,
    };
    assert!(store.update("nope", &update).await.is_err());
}

#[tokio::test]
async fn test_find_strong_is_strictly_above_threshold() {
    let (_tmp, store) = open_store().await;
    store.create(&discovered("a", "b", 0.7)).await.unwrap();
    store.create(&discovered("a", "c", 0.9)).await.unwrap();
    store.create(&discovered("d", "e", 0.75)).await.unwrap();

    let all = store.find_strong(None, 0.7).await.unwrap();
    let confidences: Vec<f64> = all.iter().map(|c| c.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.75]);

    let for_a = store.find_strong(Some("a"), 0.7).await.unwrap();
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_a[0].target_node_id, "c");

    let touching_a = store.find_for_node("a").await.unwrap();
    assert_eq!(touching_a.len(), 2);
    assert_eq!(touching_a[0].target_node_id, "c");
}

#[tokio::test]
async fn test_discovery_over_sqlite() {
    let (_tmp, store) = open_store().await;
    store
        .upsert_node(&node("n1", "sqlite write ahead logging", 0))
        .await
        .unwrap();
    store
        .upsert_node(&node("n2", "sqlite write ahead checkpoint", 20))
        .await
        .unwrap();
    store
        .upsert_node(&node("n3", "watercolor landscape painting", 3 * 24 * 60))
        .await
        .unwrap();

    let store = Arc::new(store);
    let discovery = ConnectionDiscovery::new(Arc::clone(&store), SchedulerOptions::default());

    discovery.on_node_ingested("n1");
    discovery.on_node_ingested("n2");
    discovery.wait_idle().await;

    let conns = discovery.get_node_connections("n2").await.unwrap();
    assert_eq!(conns.len(), 1);
    assert!(conns[0].links("n1", "n2"));
    assert!(discovery.get_node_connections("n3").await.unwrap().is_empty());
}
