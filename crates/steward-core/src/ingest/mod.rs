//! Offline ingestion pipeline
//!
//! parse -> wage extraction -> enrichment -> concept index -> embeddings.
//! The pipeline assembles a complete [`Snapshot`](crate::store::Snapshot)
//! and persists its JSON artifacts; nothing is published to readers until
//! every structure for the new generation is ready.

pub mod enrich;
pub mod manifest;
pub mod parser;
pub mod wages;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::index::concept::ConceptIndex;
use crate::llm::Embedder;
use crate::store::vectors::{hash_content, EmbeddingStore};
use crate::store::{save_snapshot, DataLayout, Snapshot};
use enrich::ChunkEnricher;
use futures::stream::{self, StreamExt};
use manifest::Manifest;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Concurrent enrichment calls in flight
const ENRICH_CONCURRENCY: usize = 4;
/// Embedding batch size
const EMBED_BATCH: usize = 32;

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub contract_id: String,
    pub total_chunks: usize,
    pub articles_found: Vec<u32>,
    pub missing_articles: Vec<u32>,
    pub lou_count: usize,
    pub high_stakes_count: usize,
    pub topic_distribution: BTreeMap<String, usize>,
    pub wage_classifications: usize,
    pub embeddings_written: usize,
    pub embeddings_reused: usize,
}

/// Run the full offline pipeline over one contract document.
///
/// `provided_manifest` wins over auto-extraction. Returns the assembled
/// snapshot (generation 0; the store assigns the real generation at publish)
/// plus the ingest report.
pub async fn ingest_contract(
    document: &str,
    contract_id: &str,
    enricher: &dyn ChunkEnricher,
    embedder: Arc<dyn Embedder>,
    embedding_store: &EmbeddingStore,
    layout: &DataLayout,
    provided_manifest: Option<Manifest>,
) -> Result<(Snapshot, IngestReport)> {
    tracing::info!("Ingesting contract {}", contract_id);

    // 1. Parse into hierarchical chunks
    let raw_chunks = parser::ContractParser::new(contract_id).parse(document);
    tracing::info!("Parsed {} chunks", raw_chunks.len());

    // 2. Wage tables from the appendix
    let wage_table = wages::extract_wages(document, contract_id);
    tracing::info!(
        "Extracted {} wage classifications",
        wage_table.classifications.len()
    );

    // 3. Manifest: provided file wins, else auto-extract
    let contract_manifest = match provided_manifest {
        Some(manifest) => manifest,
        None => manifest::extract_manifest(document, contract_id),
    };

    // 4. Enrich every chunk; the enricher contract guarantees completion
    let chunks: Vec<Chunk> = stream::iter(raw_chunks)
        .map(|chunk| async move {
            let enrichment = enricher.enrich(&chunk).await?;
            Ok::<Chunk, crate::error::StewardError>(enrichment.apply(&chunk))
        })
        .buffered(ENRICH_CONCURRENCY)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    // 5. Concept index over the enriched chunks
    let concept_index = ConceptIndex::build(&chunks);
    tracing::info!(
        "Concept index: {} articles, {} concepts",
        concept_index.articles.len(),
        concept_index.concept_to_articles.len()
    );

    // 6. Embeddings: reuse by content hash, re-embed the rest, drop stale
    let (written, reused) =
        embed_chunks(&chunks, contract_id, embedder, embedding_store).await?;
    let chunk_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    let stale = embedding_store.retain_chunks(contract_id, &chunk_ids)?;
    if stale > 0 {
        tracing::info!("Dropped {} stale embeddings", stale);
    }

    let report = build_report(&chunks, contract_id, &wage_table, written, reused);

    let snapshot = Snapshot::new(
        contract_id,
        chunks,
        concept_index,
        contract_manifest,
        wage_table,
        0,
    );

    save_snapshot(layout, &snapshot)?;
    tracing::info!("Ingestion of {} complete", contract_id);

    Ok((snapshot, report))
}

async fn embed_chunks(
    chunks: &[Chunk],
    contract_id: &str,
    embedder: Arc<dyn Embedder>,
    store: &EmbeddingStore,
) -> Result<(usize, usize)> {
    let mut pending: Vec<&Chunk> = Vec::new();
    let mut reused = 0usize;

    for chunk in chunks {
        match store.content_hash(contract_id, &chunk.chunk_id)? {
            Some(stored) if stored == hash_content(&chunk.content) => {
                store.update_metadata(contract_id, chunk)?;
                reused += 1;
            }
            _ => pending.push(chunk),
        }
    }

    let model = embedder.model_name().to_string();
    let mut written = 0usize;
    for batch in pending.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        for (chunk, embedding) in batch.iter().zip(embeddings.iter()) {
            store.upsert(contract_id, chunk, &model, embedding)?;
            written += 1;
        }
        tracing::debug!("Embedded {}/{} chunks", written, pending.len());
    }

    Ok((written, reused))
}

fn build_report(
    chunks: &[Chunk],
    contract_id: &str,
    wage_table: &wages::WageTable,
    embeddings_written: usize,
    embeddings_reused: usize,
) -> IngestReport {
    let mut articles_found: Vec<u32> = chunks.iter().filter_map(|c| c.article_num).collect();
    articles_found.sort_unstable();
    articles_found.dedup();

    let missing_articles = match articles_found.last() {
        Some(&max) => (1..=max)
            .filter(|n| articles_found.binary_search(n).is_err())
            .collect(),
        None => Vec::new(),
    };

    let mut topic_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for chunk in chunks {
        for topic in &chunk.topics {
            *topic_distribution.entry(topic.clone()).or_insert(0) += 1;
        }
    }

    IngestReport {
        contract_id: contract_id.to_string(),
        total_chunks: chunks.len(),
        lou_count: chunks
            .iter()
            .filter(|c| c.doc_type == crate::chunk::DocType::Lou)
            .count(),
        high_stakes_count: chunks.iter().filter(|c| c.is_high_stakes).count(),
        articles_found,
        missing_articles,
        topic_distribution,
        wage_classifications: wage_table.classifications.len(),
        embeddings_written,
        embeddings_reused,
    }
}
