//! Lexical similarity via TF-IDF vectors and cosine similarity.
//!
//! Every call builds its vocabulary from exactly the documents passed in:
//! the target plus all candidates. There is no standing index, so scores
//! are stable and explainable per invocation at the cost of
//! `O(corpus × tokens)` work per call.
//!
//! # Algorithm
//!
//! 1. Tokenize: lowercase, punctuation → whitespace, split, drop tokens
//!    shorter than 2 characters and stop words.
//! 2. `tf(term) = count / total_tokens` per document.
//! 3. `idf(term) = ln(total_docs / docs_containing_term)` over the corpus.
//! 4. `weight(term) = tf × idf`.
//! 5. Cosine similarity; `0.0` when either vector has zero norm.
//! 6. Keep candidates with `similarity >= threshold`, sort descending.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::models::KnowledgeNode;

/// Minimum similarity for a candidate to count as semantically related.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.3;

const MIN_TOKEN_CHARS: usize = 2;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "this", "that", "these", "those", "it", "its", "as",
];

/// Sparse TF-IDF vector keyed by term.
pub type TermVector = HashMap<String, f64>;

/// A candidate whose similarity to the target met the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityHit {
    pub node_id: String,
    pub similarity: f64,
}

/// Split text into normalized, stop-word-free tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Term frequencies normalized by document length.
pub fn term_frequencies(tokens: &[String]) -> HashMap<String, f64> {
    let mut counts: HashMap<String, f64> = HashMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    let total = tokens.len() as f64;
    if total > 0.0 {
        for value in counts.values_mut() {
            *value /= total;
        }
    }
    counts
}

/// Inverse document frequency of every term appearing in `documents`.
pub fn inverse_document_frequencies(documents: &[Vec<String>]) -> HashMap<String, f64> {
    let mut doc_counts: HashMap<&str, usize> = HashMap::new();
    for doc in documents {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *doc_counts.entry(term).or_insert(0) += 1;
        }
    }

    let total_docs = documents.len() as f64;
    doc_counts
        .into_iter()
        .map(|(term, count)| (term.to_string(), (total_docs / count as f64).ln()))
        .collect()
}

/// Combine term frequencies with corpus IDF into a TF-IDF vector.
pub fn tfidf_vector(tf: &HashMap<String, f64>, idf: &HashMap<String, f64>) -> TermVector {
    tf.iter()
        .map(|(term, freq)| {
            let weight = idf.get(term).copied().unwrap_or(0.0);
            (term.clone(), freq * weight)
        })
        .collect()
}

/// Cosine similarity between two sparse vectors, in `[0.0, 1.0]`.
///
/// Shared terms are summed in sorted order so `cos(a, b) == cos(b, a)`
/// exactly. Returns `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &TermVector, b: &TermVector) -> f64 {
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
        return 0.0;
    }

    let mut shared: Vec<&String> = a.keys().filter(|k| b.contains_key(*k)).collect();
    shared.sort();
    let dot: f64 = shared.iter().map(|term| a[*term] * b[*term]).sum();

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Score every other node in `corpus` against `target`.
///
/// The target itself is removed from the candidate set before scoring.
/// Returns hits with `similarity >= threshold`, most similar first.
pub fn find_similar(
    target: &KnowledgeNode,
    corpus: &[KnowledgeNode],
    threshold: f64,
) -> Vec<SimilarityHit> {
    let never = AtomicBool::new(false);
    find_similar_cancellable(target, corpus, threshold, &never).unwrap_or_default()
}

/// Like [`find_similar`], but gives up with `None` once `cancelled` is set.
///
/// The flag is checked once per document while tokenizing and once per
/// candidate while comparing.
pub fn find_similar_cancellable(
    target: &KnowledgeNode,
    corpus: &[KnowledgeNode],
    threshold: f64,
    cancelled: &AtomicBool,
) -> Option<Vec<SimilarityHit>> {
    let candidates: Vec<&KnowledgeNode> = corpus.iter().filter(|n| n.id != target.id).collect();
    if candidates.is_empty() {
        return Some(Vec::new());
    }

    let mut documents: Vec<Vec<String>> = Vec::with_capacity(candidates.len() + 1);
    documents.push(tokenize(&target.searchable_text));
    for node in &candidates {
        if cancelled.load(Ordering::Relaxed) {
            return None;
        }
        documents.push(tokenize(&node.searchable_text));
    }

    let idf = inverse_document_frequencies(&documents);
    let target_vec = tfidf_vector(&term_frequencies(&documents[0]), &idf);

    let mut hits = Vec::new();
    for (node, tokens) in candidates.iter().zip(documents.iter().skip(1)) {
        if cancelled.load(Ordering::Relaxed) {
            return None;
        }
        let candidate_vec = tfidf_vector(&term_frequencies(tokens), &idf);
        let similarity = cosine_similarity(&target_vec, &candidate_vec);
        if similarity >= threshold {
            hits.push(SimilarityHit {
                node_id: node.id.clone(),
                similarity,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Some(hits)
}
