//! Core data models shared by the scorers, the builder, and the stores.
//!
//! [`KnowledgeNode`]s are produced by the ingestion pipeline and consumed
//! read-only here. [`DiscoveredConnection`]s are the ephemeral output of a
//! single analysis pass; [`Connection`]s are what a store keeps.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type of a knowledge node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Note,
    Image,
    Webpage,
}

impl NodeType {
    /// Weight applied to temporal confidence for this content type.
    ///
    /// Notes written close together are the most likely to be related;
    /// web pages saved in the same hour the least.
    pub fn weight(self) -> f64 {
        match self {
            NodeType::Note => 1.0,
            NodeType::Image => 0.8,
            NodeType::Webpage => 0.6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Note => "note",
            NodeType::Image => "image",
            NodeType::Webpage => "webpage",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note" => Ok(NodeType::Note),
            "image" => Ok(NodeType::Image),
            "webpage" => Ok(NodeType::Webpage),
            other => bail!(
                "Unknown node type: '{}'. Must be note, image, or webpage.",
                other
            ),
        }
    }
}

/// A node in the knowledge base, as seen by connection discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    /// Opaque, stable, unique identifier.
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Text used for lexical analysis. May be empty.
    pub searchable_text: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Which signal produced (or dominated) a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Semantic,
    Temporal,
}

impl ConnectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Semantic => "semantic",
            ConnectionType::Temporal => "temporal",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(ConnectionType::Semantic),
            "temporal" => Ok(ConnectionType::Temporal),
            other => bail!("Unknown connection type: '{}'", other),
        }
    }
}

/// A connection found by one analysis pass, before it reaches storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredConnection {
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Bounded score in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Human-readable explanation. Display only.
    pub reason: String,
}

/// Discovery metadata attached to a stored connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    pub discovered_at: DateTime<Utc>,
    pub reason: String,
}

/// A persisted connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    pub confidence: f64,
    pub metadata: ConnectionMetadata,
}

impl Connection {
    /// Whether this connection joins the unordered pair `{a, b}`.
    pub fn links(&self, a: &str, b: &str) -> bool {
        (self.source_node_id == a && self.target_node_id == b)
            || (self.source_node_id == b && self.target_node_id == a)
    }

    /// Whether `node_id` is either endpoint.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }
}

/// Partial update applied to a stored connection. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionUpdate {
    pub confidence: Option<f64>,
    pub reason: Option<String>,
    pub discovered_at: Option<DateTime<Utc>>,
}

impl ConnectionUpdate {
    pub fn apply(&self, conn: &mut Connection) {
        if let Some(confidence) = self.confidence {
            conn.confidence = confidence;
        }
        if let Some(ref reason) = self.reason {
            conn.metadata.reason = reason.clone();
        }
        if let Some(discovered_at) = self.discovered_at {
            conn.metadata.discovered_at = discovered_at;
        }
    }
}
