//! Error types for the discovery scheduler and facade.

use thiserror::Error;

/// Failure of a single analysis.
///
/// Store traits speak `anyhow`; those errors arrive here as
/// [`DiscoveryError::Store`]. Empty text, empty corpora, and zero-norm
/// vectors are not errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The node was deleted (or never existed) when analysis ran.
    #[error("node not found: {node_id}")]
    NodeNotFound { node_id: String },

    /// The fusion pass did not finish within the configured bound.
    /// Nothing was cached or persisted for this attempt.
    #[error("analysis of node {node_id} timed out after {timeout_ms} ms")]
    Timeout { node_id: String, timeout_ms: u64 },

    /// The analysis task panicked or was aborted.
    #[error("analysis worker failed: {0}")]
    Worker(String),

    /// Propagated from the node or connection store.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl DiscoveryError {
    /// Only timeouts are worth retrying as-is; re-enqueue to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DiscoveryError::Timeout { .. })
    }
}

pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;
