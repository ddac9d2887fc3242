//! TTL cache of per-node discovery results.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use kb_discovery_core::models::DiscoveredConnection;

/// Default time-to-live for a cached analysis result.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    connections: Vec<DiscoveredConnection>,
    computed_at: Instant,
}

/// Size and contents of the cache, for status reporting.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// Last discovery result per node id. Entries older than the TTL are treated
/// as absent and evicted when read.
pub struct ResultCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Fresh cached result for `node_id`, if any.
    pub fn get(&mut self, node_id: &str) -> Option<Vec<DiscoveredConnection>> {
        self.get_at(node_id, Instant::now())
    }

    fn get_at(&mut self, node_id: &str, now: Instant) -> Option<Vec<DiscoveredConnection>> {
        let expired = match self.entries.get(node_id) {
            Some(entry) => now.saturating_duration_since(entry.computed_at) > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(node_id);
            return None;
        }
        self.entries.get(node_id).map(|e| e.connections.clone())
    }

    pub fn insert(&mut self, node_id: &str, connections: Vec<DiscoveredConnection>) {
        self.entries.insert(
            node_id.to_string(),
            CacheEntry {
                connections,
                computed_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for `node_id`. Returns whether one existed.
    pub fn invalidate(&mut self, node_id: &str) -> bool {
        self.entries.remove(node_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached node ids, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            keys: self.keys(),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
