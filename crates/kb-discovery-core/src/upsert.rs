//! Deduplicating persistence for discovered connections.
//!
//! At most one stored connection per unordered node pair is canonical.
//! A new discovery replaces it only when strictly more confident; otherwise
//! the stored record is returned untouched.
//!
//! This is read-then-write with no transaction. Two concurrent analyses of
//! the same pair from opposite ends can race; callers serialize analysis.

use anyhow::Result;
use chrono::Utc;

use crate::models::{Connection, ConnectionUpdate, DiscoveredConnection};
use crate::store::ConnectionStore;

/// Insert or conditionally update the stored connection for one pair.
pub async fn upsert_connection<S>(store: &S, discovered: &DiscoveredConnection) -> Result<Connection>
where
    S: ConnectionStore + ?Sized,
{
    let existing = store
        .find_between_nodes(&discovered.source_node_id, &discovered.target_node_id)
        .await?;

    let canonical = existing.into_iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    match canonical {
        None => store.create(discovered).await,
        Some(current) if discovered.confidence > current.confidence => {
            let update = ConnectionUpdate {
                confidence: Some(discovered.confidence),
                reason: Some(discovered.reason.clone()),
                discovered_at: Some(Utc::now()),
            };
            store.update(&current.id, &update).await
        }
        Some(current) => Ok(current),
    }
}

/// Upsert every discovery in order, returning the canonical records.
pub async fn persist_connections<S>(
    store: &S,
    discovered: &[DiscoveredConnection],
) -> Result<Vec<Connection>>
where
    S: ConnectionStore + ?Sized,
{
    let mut stored = Vec::with_capacity(discovered.len());
    for conn in discovered {
        stored.push(upsert_connection(store, conn).await?);
    }
    Ok(stored)
}
