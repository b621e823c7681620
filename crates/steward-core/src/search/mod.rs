//! Search engine module
//!
//! Provides:
//! - BM25 keyword scoring over the chunk corpus
//! - Vector similarity search with metadata boosts
//! - Hybrid search fusing both via Reciprocal Rank Fusion

pub mod ann_index;
pub mod bm25;
pub mod hybrid;
pub mod rrf;
pub mod vector;

pub use bm25::Bm25Index;
pub use hybrid::{HybridRequest, HybridSearcher};
pub use vector::{VectorBoosts, VectorFilters, VectorIndex};
