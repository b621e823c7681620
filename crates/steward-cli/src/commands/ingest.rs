//! `steward ingest`

use crate::app::IngestArgs;
use anyhow::{Context, Result};
use std::sync::Arc;
use steward_core::{
    ingest_contract, ChunkEnricher, Config, DataLayout, EmbeddingStore, HttpLlmClient, LlmEnricher,
    Manifest, RuleEnricher,
};

pub async fn run(args: IngestArgs, config: &Config) -> Result<()> {
    let document = std::fs::read_to_string(&args.document)
        .with_context(|| format!("reading {}", args.document.display()))?;

    let manifest = match &args.manifest {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading manifest {}", path.display()))?;
            Some(Manifest::from_json(&json)?)
        }
        None => None,
    };

    let layout = DataLayout::new(config.data_dir());
    let store = EmbeddingStore::open(&layout.vectors_db())?;
    let embedder = super::build_embedder(config, args.remote_embeddings)?;

    let rule_enricher = RuleEnricher::new();
    let llm_enricher;
    let enricher: &dyn ChunkEnricher = if args.llm_enrich {
        let client = Arc::new(HttpLlmClient::new(config.llm_service.clone())?);
        llm_enricher = LlmEnricher::new(client);
        &llm_enricher
    } else {
        &rule_enricher
    };

    let (snapshot, report) = ingest_contract(
        &document,
        &args.contract_id,
        enricher,
        embedder,
        &store,
        &layout,
        manifest,
    )
    .await?;

    println!("Ingested contract {}", snapshot.contract_id);
    println!("  chunks:            {}", report.total_chunks);
    println!(
        "  articles:          {} (missing: {:?})",
        report.articles_found.len(),
        report.missing_articles
    );
    println!("  letters of understanding: {}", report.lou_count);
    println!("  high-stakes chunks: {}", report.high_stakes_count);
    println!("  wage classifications: {}", report.wage_classifications);
    println!(
        "  embeddings:        {} written, {} reused",
        report.embeddings_written, report.embeddings_reused
    );
    if !report.topic_distribution.is_empty() {
        println!("  topics:");
        for (topic, count) in &report.topic_distribution {
            println!("    {:20} {}", topic, count);
        }
    }

    Ok(())
}
