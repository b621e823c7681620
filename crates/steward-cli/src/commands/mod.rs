//! CLI subcommands

pub mod ingest;
pub mod query;
pub mod status;
pub mod wage;

use std::sync::Arc;
use steward_core::{Config, Embedder, FallbackEmbedder, HttpEmbedder};

/// Fallback hash dimensions when no embedding service is configured
const FALLBACK_DIMENSIONS: usize = 384;

/// Pick the embedder: the configured HTTP service when requested, the
/// deterministic hash fallback otherwise.
pub(crate) fn build_embedder(config: &Config, remote: bool) -> anyhow::Result<Arc<dyn Embedder>> {
    if remote {
        Ok(Arc::new(HttpEmbedder::new(config.llm_service.clone())?))
    } else {
        Ok(Arc::new(FallbackEmbedder::new(
            config
                .llm_service
                .embedding_dimensions
                .unwrap_or(FALLBACK_DIMENSIONS),
        )))
    }
}
