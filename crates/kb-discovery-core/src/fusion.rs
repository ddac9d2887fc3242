//! Score fusion: merges lexical and temporal signals into connections.
//!
//! # Fusion Rules
//!
//! For every candidate flagged by at least one scorer:
//!
//! | Signals | Type | Confidence |
//! |---------|------|------------|
//! | semantic only | `semantic` | `semantic` |
//! | temporal only | `temporal` | `temporal` |
//! | both | larger raw score (ties → `semantic`) | `0.7 × semantic + 0.3 × temporal` |
//!
//! Results are sorted by confidence, descending.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Duration;

use crate::lexical::{self, DEFAULT_SIMILARITY_THRESHOLD};
use crate::models::{ConnectionType, DiscoveredConnection, KnowledgeNode};
use crate::temporal;

/// Weight of the lexical score when both signals are present.
pub const SEMANTIC_WEIGHT: f64 = 0.7;
/// Weight of the temporal score when both signals are present.
pub const TEMPORAL_WEIGHT: f64 = 0.3;
/// Connections strictly above this confidence are strong.
pub const STRONG_CONNECTION_THRESHOLD: f64 = 0.7;

/// Tuning parameters for a discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryParams {
    pub similarity_threshold: f64,
    pub temporal_window: Duration,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            temporal_window: temporal::default_window(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Signals {
    semantic: Option<f64>,
    temporal: Option<f64>,
}

/// Whether `confidence` qualifies as a strong connection (`> 0.7`).
pub fn is_strong_connection(confidence: f64) -> bool {
    confidence > STRONG_CONNECTION_THRESHOLD
}

/// Filter in-memory discoveries down to the strong ones.
pub fn strong_connections(connections: &[DiscoveredConnection]) -> Vec<&DiscoveredConnection> {
    connections
        .iter()
        .filter(|c| is_strong_connection(c.confidence))
        .collect()
}

/// Discover connections from `target` to every related node in `corpus`.
pub fn discover_connections(
    target: &KnowledgeNode,
    corpus: &[KnowledgeNode],
    params: &DiscoveryParams,
) -> Vec<DiscoveredConnection> {
    let never = AtomicBool::new(false);
    discover_connections_cancellable(target, corpus, params, &never).unwrap_or_default()
}

/// Cancellable form of [`discover_connections`].
///
/// Returns `None` if `cancelled` was observed set before the pass finished.
pub fn discover_connections_cancellable(
    target: &KnowledgeNode,
    corpus: &[KnowledgeNode],
    params: &DiscoveryParams,
    cancelled: &AtomicBool,
) -> Option<Vec<DiscoveredConnection>> {
    let semantic_hits =
        lexical::find_similar_cancellable(target, corpus, params.similarity_threshold, cancelled)?;
    if cancelled.load(Ordering::Relaxed) {
        return None;
    }
    let temporal_hits =
        temporal::find_temporal_connections(target, corpus, params.temporal_window);

    let mut signals: BTreeMap<String, Signals> = BTreeMap::new();
    for hit in semantic_hits {
        signals.entry(hit.node_id).or_default().semantic = Some(hit.similarity);
    }
    for hit in temporal_hits {
        signals.entry(hit.node_id).or_default().temporal = Some(hit.confidence);
    }

    let mut connections: Vec<DiscoveredConnection> = signals
        .into_iter()
        .filter_map(|(candidate_id, s)| resolve(&target.id, candidate_id, s))
        .collect();

    connections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Some(connections)
}

/// Fused confidence between exactly two nodes.
///
/// `corpus` provides IDF context; it is scored the same way as a full
/// discovery pass from `a`, so the value matches what analyzing `a` would
/// produce for the pair. Returns `0.0` if neither scorer flags the pair.
pub fn pairwise_confidence(
    a: &KnowledgeNode,
    b: &KnowledgeNode,
    corpus: &[KnowledgeNode],
    params: &DiscoveryParams,
) -> f64 {
    if a.id == b.id {
        return 0.0;
    }

    let mut context: Vec<KnowledgeNode> = corpus
        .iter()
        .filter(|n| n.id != a.id && n.id != b.id)
        .cloned()
        .collect();
    context.push(b.clone());

    let semantic_score = lexical::find_similar(a, &context, params.similarity_threshold)
        .into_iter()
        .find(|hit| hit.node_id == b.id)
        .map(|hit| hit.similarity);

    let diff = temporal::time_difference(a, b);
    let in_window = params.temporal_window.num_milliseconds() > 0 && diff <= params.temporal_window;
    let temporal_score = if in_window {
        Some(temporal::calculate_temporal_confidence(
            diff,
            params.temporal_window,
            a.node_type,
            b.node_type,
        ))
    } else {
        None
    };

    let signals = Signals {
        semantic: semantic_score,
        temporal: temporal_score,
    };
    resolve(&a.id, b.id.clone(), signals)
        .map(|c| c.confidence)
        .unwrap_or(0.0)
}

fn resolve(source_id: &str, target_id: String, s: Signals) -> Option<DiscoveredConnection> {
    let (connection_type, confidence, reason) = match (s.semantic, s.temporal) {
        (Some(sem), None) => (ConnectionType::Semantic, sem, semantic_reason(sem)),
        (None, Some(tmp)) => (ConnectionType::Temporal, tmp, temporal_reason(tmp)),
        (Some(sem), Some(tmp)) => {
            let fused = sem * SEMANTIC_WEIGHT + tmp * TEMPORAL_WEIGHT;
            let kind = if sem >= tmp {
                ConnectionType::Semantic
            } else {
                ConnectionType::Temporal
            };
            (kind, fused, combined_reason(sem, tmp))
        }
        (None, None) => return None,
    };

    Some(DiscoveredConnection {
        source_node_id: source_id.to_string(),
        target_node_id: target_id,
        connection_type,
        confidence: confidence.clamp(0.0, 1.0),
        reason,
    })
}

fn percent(score: f64) -> f64 {
    (score * 100.0).round()
}

fn semantic_reason(sem: f64) -> String {
    format!("Similar content ({}% lexical similarity)", percent(sem))
}

fn temporal_reason(tmp: f64) -> String {
    format!("Created close in time ({}% temporal proximity)", percent(tmp))
}

fn combined_reason(sem: f64, tmp: f64) -> String {
    format!(
        "Similar content ({}% lexical similarity) and created close in time ({}% temporal proximity)",
        percent(sem),
        percent(tmp)
    )
}
