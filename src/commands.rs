//! CLI entry points for the `kbd` binary.
//!
//! Each `run_*` function opens the configured database, wires a
//! [`ConnectionDiscovery`] over a [`SqliteStore`], performs one command,
//! and prints the result to stdout (human-readable or JSON).

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use kb_discovery_core::models::{Connection, KnowledgeNode, NodeType};
use kb_discovery_core::store::NodeStore;

use crate::config::Config;
use crate::db;
use crate::discovery::ConnectionDiscovery;
use crate::migrate;
use crate::scheduler::SchedulerOptions;
use crate::sqlite_store::SqliteStore;

async fn open(config: &Config) -> Result<(Arc<SqliteStore>, ConnectionDiscovery<SqliteStore>)> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let discovery = ConnectionDiscovery::new(
        Arc::clone(&store),
        SchedulerOptions::from(&config.discovery),
    );
    Ok((store, discovery))
}

async fn close(store: &SqliteStore) {
    store.pool().close().await;
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_connections(node_id: Option<&str>, conns: &[Connection]) {
    if conns.is_empty() {
        println!("No connections.");
        return;
    }
    for (i, c) in conns.iter().enumerate() {
        let other = match node_id {
            Some(id) if c.source_node_id == id => c.target_node_id.as_str(),
            Some(_) => c.source_node_id.as_str(),
            None => c.target_node_id.as_str(),
        };
        let from = match node_id {
            Some(id) => id,
            None => c.source_node_id.as_str(),
        };
        println!(
            "{}. [{:.2}] {} {} <-> {}",
            i + 1,
            c.confidence,
            c.connection_type,
            from,
            other
        );
        println!("    reason: {}", c.metadata.reason);
        println!(
            "    discovered: {}",
            c.metadata.discovered_at.format("%Y-%m-%dT%H:%M:%SZ")
        );
    }
}

/// `kbd init`: create the database and schema.
pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

/// `kbd node add`: store a node, then analyze it at ingest priority.
pub async fn run_node_add(
    config: &Config,
    node_type: &str,
    text: &str,
    id: Option<String>,
    created: Option<String>,
) -> Result<()> {
    let node_type: NodeType = node_type.parse()?;
    let created = created
        .as_deref()
        .map(DateTime::parse_from_rfc3339)
        .transpose()?
        .map(|t| t.with_timezone(&Utc));
    let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let (store, discovery) = open(config).await?;
    let existing = store.find_by_id(&id).await?;
    let existed = existing.is_some();

    // Re-adding edits the node: it keeps its creation time unless one is given.
    let now = Utc::now();
    let node = match existing {
        Some(prev) => KnowledgeNode {
            id,
            node_type,
            searchable_text: text.to_string(),
            created_at: created.unwrap_or(prev.created_at),
            modified_at: now,
        },
        None => {
            let created_at = created.unwrap_or(now);
            KnowledgeNode {
                id,
                node_type,
                searchable_text: text.to_string(),
                created_at,
                modified_at: created_at,
            }
        }
    };
    store.upsert_node(&node).await?;

    if existed {
        discovery.reanalyze_node(&node.id);
    } else {
        discovery.on_node_ingested(&node.id);
    }
    discovery.wait_idle().await;

    let conns = discovery.get_node_connections(&node.id).await?;
    println!("{} node {}", if existed { "updated" } else { "added" }, node.id);
    println!("  connections: {}", conns.len());

    close(&store).await;
    Ok(())
}

/// `kbd node list`
pub async fn run_node_list(config: &Config, json: bool) -> Result<()> {
    let (store, _) = open(config).await?;
    let nodes = store.find_all().await?;
    close(&store).await;

    if json {
        return print_json(&nodes);
    }
    if nodes.is_empty() {
        println!("No nodes.");
        return Ok(());
    }
    for node in &nodes {
        let preview: String = node.searchable_text.chars().take(60).collect();
        println!(
            "{}  {:<8} {}  \"{}\"",
            node.id,
            node.node_type.as_str(),
            node.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
            preview.replace('\n', " ")
        );
    }
    Ok(())
}

/// `kbd analyze <id>` or `kbd analyze --all`.
pub async fn run_analyze(config: &Config, id: Option<String>, all: bool, json: bool) -> Result<()> {
    let (store, discovery) = open(config).await?;

    let results = match (id, all) {
        (Some(id), false) => vec![discovery.analyze_node_sync(&id).await?],
        (None, true) => {
            let ids: Vec<String> = store.find_all().await?.into_iter().map(|n| n.id).collect();
            discovery.batch_analyze(&ids).await
        }
        _ => bail!("Specify exactly one of <id> or --all"),
    };
    close(&store).await;

    if json {
        return print_json(&results);
    }
    for r in &results {
        println!("analyzed {}", r.node_id);
        println!("  connections found: {}", r.connections_found);
        println!("  strong connections: {}", r.strong_connections);
        println!("  time: {} ms", r.processing_time_ms);
    }
    println!("ok");
    Ok(())
}

/// `kbd connections <id> [--strong]`
pub async fn run_connections(config: &Config, id: &str, strong: bool, json: bool) -> Result<()> {
    let (store, discovery) = open(config).await?;
    let conns = if strong {
        discovery.get_strong_connections(Some(id)).await?
    } else {
        discovery.get_node_connections(id).await?
    };
    close(&store).await;

    if json {
        return print_json(&conns);
    }
    print_connections(Some(id), &conns);
    Ok(())
}

/// `kbd strong`: every strong connection in the store.
pub async fn run_strong(config: &Config, json: bool) -> Result<()> {
    let (store, discovery) = open(config).await?;
    let conns = discovery.get_strong_connections(None).await?;
    close(&store).await;

    if json {
        return print_json(&conns);
    }
    print_connections(None, &conns);
    Ok(())
}

/// `kbd confidence <a> <b>`
pub async fn run_confidence(config: &Config, a: &str, b: &str) -> Result<()> {
    let (store, discovery) = open(config).await?;
    let confidence = discovery.calculate_confidence(a, b).await?;
    close(&store).await;

    println!("{:.4}", confidence);
    Ok(())
}

/// `kbd clusters`
pub async fn run_clusters(config: &Config, json: bool) -> Result<()> {
    let (store, discovery) = open(config).await?;
    let clusters = discovery.find_temporal_clusters().await?;
    close(&store).await;

    if json {
        let ids: Vec<Vec<&str>> = clusters
            .iter()
            .map(|c| c.iter().map(|n| n.id.as_str()).collect())
            .collect();
        return print_json(&ids);
    }
    for (i, cluster) in clusters.iter().enumerate() {
        println!("cluster {} ({} nodes)", i + 1, cluster.len());
        for node in cluster {
            println!(
                "  {}  {}",
                node.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
                node.id
            );
        }
    }
    Ok(())
}

/// `kbd status`
pub async fn run_status(config: &Config) -> Result<()> {
    let (store, discovery) = open(config).await?;
    let status = discovery.get_worker_status();
    close(&store).await;
    print_json(&status)
}
