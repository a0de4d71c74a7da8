//! Duplicate removal for scored items.
//!
//! Exact duplicates share a SHA-256 hash of normalized content. Near
//! duplicates have term-frequency vectors whose cosine similarity reaches the
//! configured threshold. The highest-scoring representative always survives.

use crate::models::ScoredItem;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Hashes normalized item content.
pub struct ContentHasher;

impl ContentHasher {
    /// Hex-encoded SHA-256 of the normalized content.
    #[must_use]
    pub fn hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::normalize(content).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Lowercases and collapses whitespace.
    #[must_use]
    pub fn normalize(content: &str) -> String {
        content
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

type TermVector = HashMap<String, f32>;

fn term_vector(content: &str) -> TermVector {
    let mut tf = TermVector::new();
    for term in content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *tf.entry(term.to_lowercase()).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine similarity of two sparse term vectors, 0 if either is empty.
fn cosine_similarity(a: &TermVector, b: &TermVector) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f32 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Removes duplicates, returning survivors in descending score order.
#[must_use]
pub fn deduplicate(mut items: Vec<ScoredItem>, similarity_threshold: f32) -> Vec<ScoredItem> {
    items.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen_hashes = HashSet::new();
    let mut kept_vectors: Vec<TermVector> = Vec::new();
    let mut kept = Vec::with_capacity(items.len());

    for item in items {
        if !seen_hashes.insert(ContentHasher::hash(&item.item.content)) {
            continue;
        }
        let vector = term_vector(&item.item.content);
        if kept_vectors
            .iter()
            .any(|other| cosine_similarity(&vector, other) >= similarity_threshold)
        {
            continue;
        }
        kept_vectors.push(vector);
        kept.push(item);
    }
    kept
}
