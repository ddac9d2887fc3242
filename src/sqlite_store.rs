//! SQLite-backed [`NodeStore`] and [`ConnectionStore`].
//!
//! Maps each store operation onto the `nodes` and `connections` tables
//! created by [`crate::migrate`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use kb_discovery_core::models::{
    Connection, ConnectionMetadata, ConnectionUpdate, DiscoveredConnection, KnowledgeNode,
};
use kb_discovery_core::store::{ConnectionStore, NodeStore};

const CONNECTION_COLUMNS: &str =
    "id, source_node_id, target_node_id, connection_type, confidence, reason, discovered_at";

/// SQLite implementation of the store traits.
///
/// Wraps a [`SqlitePool`]; cloning the pool is cheap, so the store can be
/// shared behind an `Arc` by the scheduler and the CLI at once.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a node, or replace its type, text, and timestamps if the id exists.
    pub async fn upsert_node(&self, node: &KnowledgeNode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (id, node_type, searchable_text, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                node_type = excluded.node_type,
                searchable_text = excluded.searchable_text,
                created_at = excluded.created_at,
                modified_at = excluded.modified_at
            "#,
        )
        .bind(&node.id)
        .bind(node.node_type.as_str())
        .bind(&node.searchable_text)
        .bind(node.created_at.timestamp_millis())
        .bind(node.modified_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_connection(&self, id: &str) -> Result<Option<Connection>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM connections WHERE id = ?",
            CONNECTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_connection).transpose()
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("timestamp out of range: {}", ms))
}

fn row_to_node(row: &SqliteRow) -> Result<KnowledgeNode> {
    let node_type: String = row.get("node_type");
    Ok(KnowledgeNode {
        id: row.get("id"),
        node_type: node_type.parse()?,
        searchable_text: row.get("searchable_text"),
        created_at: from_millis(row.get("created_at"))?,
        modified_at: from_millis(row.get("modified_at"))?,
    })
}

fn row_to_connection(row: &SqliteRow) -> Result<Connection> {
    let connection_type: String = row.get("connection_type");
    Ok(Connection {
        id: row.get("id"),
        source_node_id: row.get("source_node_id"),
        target_node_id: row.get("target_node_id"),
        connection_type: connection_type.parse()?,
        confidence: row.get("confidence"),
        metadata: ConnectionMetadata {
            discovered_at: from_millis(row.get("discovered_at"))?,
            reason: row.get("reason"),
        },
    })
}

#[async_trait]
impl NodeStore for SqliteStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        let row = sqlx::query(
            "SELECT id, node_type, searchable_text, created_at, modified_at FROM nodes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_node).transpose()
    }

    async fn find_all(&self) -> Result<Vec<KnowledgeNode>> {
        let rows = sqlx::query(
            "SELECT id, node_type, searchable_text, created_at, modified_at FROM nodes ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_node).collect()
    }
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn find_between_nodes(&self, a: &str, b: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM connections
            WHERE (source_node_id = ? AND target_node_id = ?)
               OR (source_node_id = ? AND target_node_id = ?)
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_connection).collect()
    }

    async fn create(&self, connection: &DiscoveredConnection) -> Result<Connection> {
        let stored = Connection {
            id: Uuid::new_v4().to_string(),
            source_node_id: connection.source_node_id.clone(),
            target_node_id: connection.target_node_id.clone(),
            connection_type: connection.connection_type,
            confidence: connection.confidence,
            metadata: ConnectionMetadata {
                discovered_at: Utc::now(),
                reason: connection.reason.clone(),
            },
        };

        sqlx::query(
            r#"
            INSERT INTO connections (id, source_node_id, target_node_id, connection_type,
                                     confidence, reason, discovered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.source_node_id)
        .bind(&stored.target_node_id)
        .bind(stored.connection_type.as_str())
        .bind(stored.confidence)
        .bind(&stored.metadata.reason)
        .bind(stored.metadata.discovered_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn update(&self, id: &str, update: &ConnectionUpdate) -> Result<Connection> {
        let result = sqlx::query(
            r#"
            UPDATE connections SET
                confidence = COALESCE(?, confidence),
                reason = COALESCE(?, reason),
                discovered_at = COALESCE(?, discovered_at)
            WHERE id = ?
            "#,
        )
        .bind(update.confidence)
        .bind(update.reason.as_deref())
        .bind(update.discovered_at.map(|t| t.timestamp_millis()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("connection not found: {}", id);
        }

        match self.fetch_connection(id).await? {
            Some(conn) => Ok(conn),
            None => bail!("connection not found: {}", id),
        }
    }

    async fn find_for_node(&self, node_id: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM connections
            WHERE source_node_id = ? OR target_node_id = ?
            ORDER BY confidence DESC
            "#,
            CONNECTION_COLUMNS
        ))
        .bind(node_id)
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_connection).collect()
    }

    async fn find_strong(
        &self,
        node_id: Option<&str>,
        threshold: f64,
    ) -> Result<Vec<Connection>> {
        let rows = match node_id {
            Some(id) => {
                sqlx::query(&format!(
                    r#"
                    SELECT {} FROM connections
                    WHERE confidence > ? AND (source_node_id = ? OR target_node_id = ?)
                    ORDER BY confidence DESC
                    "#,
                    CONNECTION_COLUMNS
                ))
                .bind(threshold)
                .bind(id)
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM connections WHERE confidence > ? ORDER BY confidence DESC",
                    CONNECTION_COLUMNS
                ))
                .bind(threshold)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(row_to_connection).collect()
    }
}
