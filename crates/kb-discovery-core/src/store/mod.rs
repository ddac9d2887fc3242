//! Storage abstraction for connection discovery.
//!
//! Discovery reads nodes through [`NodeStore`] and writes connections
//! through [`ConnectionStore`]. Backends (SQLite, in-memory) implement
//! both; the scorers never touch storage directly.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Connection, ConnectionUpdate, DiscoveredConnection, KnowledgeNode};

/// Read access to the knowledge-node corpus.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Look up a single node.
    async fn find_by_id(&self, id: &str) -> Result<Option<KnowledgeNode>>;

    /// The full corpus, used for both scoring and IDF.
    async fn find_all(&self) -> Result<Vec<KnowledgeNode>>;
}

/// Persistence for discovered connections.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_between_nodes`](ConnectionStore::find_between_nodes) | Existing records for an unordered pair |
/// | [`create`](ConnectionStore::create) | Insert a new connection, assigning id and timestamp |
/// | [`update`](ConnectionStore::update) | Apply a partial update in place |
/// | [`find_for_node`](ConnectionStore::find_for_node) | All connections touching a node |
/// | [`find_strong`](ConnectionStore::find_strong) | Connections above a confidence threshold |
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Connections joining `a` and `b` in either direction.
    async fn find_between_nodes(&self, a: &str, b: &str) -> Result<Vec<Connection>>;

    /// Store a new connection. The store assigns `id` and `discovered_at`.
    async fn create(&self, connection: &DiscoveredConnection) -> Result<Connection>;

    /// Update a stored connection and return the new record.
    ///
    /// Fails if no connection with `id` exists.
    async fn update(&self, id: &str, update: &ConnectionUpdate) -> Result<Connection>;

    /// Connections where `node_id` is either endpoint, most confident first.
    async fn find_for_node(&self, node_id: &str) -> Result<Vec<Connection>>;

    /// Connections with `confidence > threshold`, optionally limited to
    /// those touching `node_id`, most confident first.
    async fn find_strong(&self, node_id: Option<&str>, threshold: f64)
        -> Result<Vec<Connection>>;
}
