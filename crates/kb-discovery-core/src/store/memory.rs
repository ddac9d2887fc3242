//! In-memory [`NodeStore`] + [`ConnectionStore`] for tests and embedders
//! without a database.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    Connection, ConnectionMetadata, ConnectionUpdate, DiscoveredConnection, KnowledgeNode,
};

use super::{ConnectionStore, NodeStore};

/// In-memory store for nodes and connections.
pub struct InMemoryStore {
    nodes: RwLock<HashMap<String, KnowledgeNode>>,
    connections: RwLock<Vec<Connection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            connections: RwLock::new(Vec::new()),
        }
    }

    /// Build a store pre-populated with `nodes`.
    pub fn with_nodes(nodes: impl IntoIterator<Item = KnowledgeNode>) -> Self {
        let store = Self::new();
        for node in nodes {
            store.insert_node(node);
        }
        store
    }

    /// Insert or replace a node.
    pub fn insert_node(&self, node: KnowledgeNode) {
        self.nodes.write().unwrap().insert(node.id.clone(), node);
    }

    /// Remove a node, returning it if it existed. Connections are kept.
    pub fn remove_node(&self, id: &str) -> Option<KnowledgeNode> {
        self.nodes.write().unwrap().remove(id)
    }

    /// Drop every stored connection.
    pub fn clear_connections(&self) {
        self.connections.write().unwrap().clear();
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    /// Snapshot of all stored connections, in insertion order.
    pub fn all_connections(&self) -> Vec<Connection> {
        self.connections.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn by_confidence_desc(conns: &mut [Connection]) {
    conns.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[async_trait]
impl NodeStore for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        Ok(self.nodes.read().unwrap().get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<KnowledgeNode>> {
        let mut nodes: Vec<KnowledgeNode> = self.nodes.read().unwrap().values().cloned().collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(nodes)
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn find_between_nodes(&self, a: &str, b: &str) -> Result<Vec<Connection>> {
        Ok(self
            .connections
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.links(a, b))
            .cloned()
            .collect())
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
        self.connections.write().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &str, update: &ConnectionUpdate) -> Result<Connection> {
        let mut conns = self.connections.write().unwrap();
        match conns.iter_mut().find(|c| c.id == id) {
            Some(conn) => {
                update.apply(conn);
                Ok(conn.clone())
            }
            None => bail!("connection not found: {}", id),
        }
    }

    async fn find_for_node(&self, node_id: &str) -> Result<Vec<Connection>> {
        let mut conns: Vec<Connection> = self
            .connections
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.touches(node_id))
            .cloned()
            .collect();
        by_confidence_desc(&mut conns);
        Ok(conns)
    }

    async fn find_strong(
        &self,
        node_id: Option<&str>,
        threshold: f64,
    ) -> Result<Vec<Connection>> {
        let mut conns: Vec<Connection> = self
            .connections
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.confidence > threshold)
            .filter(|c| node_id.map_or(true, |id| c.touches(id)))
            .cloned()
            .collect();
        by_confidence_desc(&mut conns);
        Ok(conns)
    }
}
