//! `steward status`

use crate::app::{OutputFormat, StatusArgs};
use anyhow::Result;
use serde_json::json;
use steward_core::{load_snapshot, Config, DataLayout, EmbeddingStore};

pub async fn run(args: StatusArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let layout = DataLayout::new(config.data_dir());
    let manifests_dir = layout.data_dir.join("manifests");

    let mut contract_ids: Vec<String> = Vec::new();
    if let Some(contract_id) = &args.contract_id {
        contract_ids.push(contract_id.clone());
    } else if manifests_dir.exists() {
        for entry in std::fs::read_dir(&manifests_dir)? {
            let path = entry?.path();
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    contract_ids.push(stem.to_string());
                }
            }
        }
        contract_ids.sort();
    }

    if contract_ids.is_empty() {
        println!("No ingested contracts under {}", layout.data_dir.display());
        return Ok(());
    }

    let store = EmbeddingStore::open(&layout.vectors_db())?;
    let mut rows = Vec::new();

    for contract_id in &contract_ids {
        match load_snapshot(&layout, contract_id) {
            Ok(snapshot) => {
                let embeddings = store.count(contract_id)?;
                rows.push(json!({
                    "contract_id": contract_id,
                    "employer": snapshot.manifest.employer,
                    "union_local": snapshot.manifest.union_local,
                    "chunks": snapshot.chunks.len(),
                    "articles": snapshot.article_numbers().len(),
                    "concepts": snapshot.concept_index.concept_to_articles.len(),
                    "wage_classifications": snapshot.wage_table.classifications.len(),
                    "embeddings": embeddings,
                }));
            }
            Err(e) => {
                tracing::warn!("Could not load {}: {}", contract_id, e);
            }
        }
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in rows {
        println!(
            "{}  chunks={} articles={} concepts={} wage_classes={} embeddings={}",
            row["contract_id"].as_str().unwrap_or("?"),
            row["chunks"],
            row["articles"],
            row["concepts"],
            row["wage_classifications"],
            row["embeddings"],
        );
    }

    Ok(())
}
