//! Temporal proximity scoring and time-based clustering.
//!
//! Two nodes are temporally related when they were created or modified
//! within a window of each other. Confidence decays exponentially with the
//! gap and is scaled by the content types involved:
//!
//! ```text
//! ratio      = gap / window
//! base       = e^(-3 × ratio)          // ~1.0 at 0, ~0.05 at the edge
//! type_w     = (weight(a) + weight(b)) / 2
//! confidence = clamp(base × type_w, 0, 1)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{KnowledgeNode, NodeType};

/// Default proximity window, in seconds.
pub const DEFAULT_TEMPORAL_WINDOW_SECS: i64 = 3600;

const DECAY_RATE: f64 = 3.0;

/// The default one-hour window.
pub fn default_window() -> Duration {
    Duration::seconds(DEFAULT_TEMPORAL_WINDOW_SECS)
}

/// A candidate within the window of the target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalHit {
    pub node_id: String,
    pub confidence: f64,
    /// Closer of the creation and modification gaps, in milliseconds.
    pub time_difference_ms: i64,
}

fn abs_gap_ms(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    a.signed_duration_since(b).num_milliseconds().abs()
}

/// Gap between two nodes: the smaller of the creation and modification gaps.
pub fn time_difference(a: &KnowledgeNode, b: &KnowledgeNode) -> Duration {
    let created = abs_gap_ms(a.created_at, b.created_at);
    let modified = abs_gap_ms(a.modified_at, b.modified_at);
    Duration::milliseconds(created.min(modified))
}

/// Confidence for a gap of `time_diff` within `window`.
///
/// Returns `0.0` when the gap exceeds the window or the window is not
/// positive.
pub fn calculate_temporal_confidence(
    time_diff: Duration,
    window: Duration,
    source_type: NodeType,
    target_type: NodeType,
) -> f64 {
    let window_ms = window.num_milliseconds();
    let diff_ms = time_diff.num_milliseconds().abs();
    if window_ms <= 0 || diff_ms > window_ms {
        return 0.0;
    }

    let ratio = diff_ms as f64 / window_ms as f64;
    let base = (-DECAY_RATE * ratio).exp();
    let type_weight = (source_type.weight() + target_type.weight()) / 2.0;

    (base * type_weight).clamp(0.0, 1.0)
}

/// All nodes in `corpus` within `window` of `target`, most confident first.
pub fn find_temporal_connections(
    target: &KnowledgeNode,
    corpus: &[KnowledgeNode],
    window: Duration,
) -> Vec<TemporalHit> {
    if window.num_milliseconds() <= 0 {
        return Vec::new();
    }

    let mut hits: Vec<TemporalHit> = corpus
        .iter()
        .filter(|n| n.id != target.id)
        .filter_map(|candidate| {
            let diff = time_difference(target, candidate);
            if diff > window {
                return None;
            }
            Some(TemporalHit {
                node_id: candidate.id.clone(),
                confidence: calculate_temporal_confidence(
                    diff,
                    window,
                    target.node_type,
                    candidate.node_type,
                ),
                time_difference_ms: diff.num_milliseconds(),
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}

/// Group nodes into runs whose consecutive creation times are at most
/// `window` apart.
///
/// Nodes are ordered by creation time first; each cluster is extended while
/// the gap to its previous member stays within the window.
pub fn cluster_by_time(nodes: &[KnowledgeNode], window: Duration) -> Vec<Vec<KnowledgeNode>> {
    let mut sorted: Vec<&KnowledgeNode> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.created_at);

    let mut clusters: Vec<Vec<KnowledgeNode>> = Vec::new();
    let mut current: Vec<KnowledgeNode> = Vec::new();

    for node in sorted {
        if let Some(prev) = current.last() {
            if node.created_at.signed_duration_since(prev.created_at) > window {
                clusters.push(std::mem::take(&mut current));
            }
        }
        current.push(node.clone());
    }
    if !current.is_empty() {
        clusters.push(current);
    }

    clusters
}
