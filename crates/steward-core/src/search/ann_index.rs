//! Approximate nearest neighbor index over chunk embeddings
//!
//! HNSW (instant-distance) above a corpus-size threshold; brute-force cosine
//! below it, where exact scan is both faster to build and exact. One index
//! per contract snapshot, rebuilt on re-ingestion.

use crate::store::vectors::cosine_similarity;
use instant_distance::{Builder, HnswMap, Search};

/// Minimum embedding count to justify building an HNSW graph.
/// A single contract is usually a few hundred chunks; brute force wins there.
const ANN_THRESHOLD: usize = 1000;

/// Wrapper for f32 vectors implementing instant_distance::Point
#[derive(Clone)]
struct EmbeddingPoint {
    values: Vec<f32>,
}

impl instant_distance::Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        // Cosine distance = 1.0 - cosine_similarity
        1.0 - cosine_similarity(&self.values, &other.values)
    }
}

/// Nearest-neighbor index: HNSW or exact scan depending on corpus size
pub struct AnnIndex {
    hnsw: Option<HnswMap<EmbeddingPoint, String>>,
    embeddings: Vec<(String, Vec<f32>)>,
}

impl AnnIndex {
    /// Build from (chunk_id, embedding) pairs
    pub fn build(embeddings: Vec<(String, Vec<f32>)>) -> Self {
        let hnsw = if embeddings.len() >= ANN_THRESHOLD {
            let (points, keys): (Vec<EmbeddingPoint>, Vec<String>) = embeddings
                .iter()
                .map(|(key, values)| {
                    (
                        EmbeddingPoint {
                            values: values.clone(),
                        },
                        key.clone(),
                    )
                })
                .unzip();
            tracing::info!("Building HNSW index over {} embeddings", keys.len());
            Some(Builder::default().build(points, keys))
        } else {
            tracing::debug!(
                "Corpus of {} embeddings below HNSW threshold, using exact scan",
                embeddings.len()
            );
            None
        };

        Self { hnsw, embeddings }
    }

    /// K nearest neighbors as (chunk_id, cosine_similarity), best first,
    /// chunk id as tie-break.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(String, f64)> {
        if let Some(map) = &self.hnsw {
            let query_point = EmbeddingPoint {
                values: query.to_vec(),
            };
            let mut search = Search::default();
            return map
                .search(&query_point, &mut search)
                .take(k)
                .map(|item| (item.value.clone(), 1.0 - item.distance as f64))
                .collect();
        }

        let mut scored: Vec<(String, f64)> = self
            .embeddings
            .iter()
            .map(|(id, emb)| (id.clone(), cosine_similarity(query, emb) as f64))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}
