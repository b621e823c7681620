//! `steward query`

use crate::app::{OutputFormat, QueryArgs};
use anyhow::Result;
use std::sync::Arc;
use steward_core::{
    load_snapshot, Config, DataLayout, EmbeddingStore, HttpLlmClient, LLMClient, RetrieveOptions,
    Retriever,
};

pub async fn run(args: QueryArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let question = args.question.join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("empty question");
    }

    let layout = DataLayout::new(config.data_dir());
    let snapshot = load_snapshot(&layout, &args.contract_id)?;
    let store = EmbeddingStore::open(&layout.vectors_db())?;
    let records = store.load_collection(&args.contract_id)?;

    let embedder = super::build_embedder(config, args.remote_embeddings)?;
    let llm: Option<Arc<dyn LLMClient>> = if args.llm {
        Some(Arc::new(HttpLlmClient::new(config.llm_service.clone())?))
    } else {
        None
    };

    let retriever = Retriever::new(
        snapshot,
        records,
        embedder,
        llm,
        config.retrieval.clone(),
    );

    let options = RetrieveOptions {
        classification: args.classification.clone(),
        hours_worked: args.hours,
        months_employed: args.months,
        effective_date: None,
        top_k: Some(args.top_k),
    };

    let response = retriever.retrieve(&question, &options).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!(
        "intent: {} (confidence {:.2}{}{})",
        response.intent.intent_type,
        response.intent.confidence,
        response
            .intent
            .topic
            .as_deref()
            .map(|t| format!(", topic {}", t))
            .unwrap_or_default(),
        if response.escalation_required {
            ", ESCALATION"
        } else {
            ""
        }
    );
    if !response.explicit_articles_fetched.is_empty() {
        println!("explicit articles: {:?}", response.explicit_articles_fetched);
    }
    println!(
        "angles: {}, interpreter {}ms (ok: {})",
        response.search_angles_used,
        response.interpretation.latency_ms,
        response.interpretation.success
    );
    if let Some(rerank) = &response.reranker_result {
        println!(
            "reranker: {} position changes, {}ms (ok: {})",
            rerank.position_changes, rerank.latency_ms, rerank.success
        );
    }

    if let Some(wage) = &response.wage_info {
        println!(
            "\nwage: {} -> ${:.2} ({}, effective {}) [{}]",
            wage.classification, wage.rate, wage.step, wage.effective_date, wage.citation
        );
    }

    println!();
    for (i, scored) in response.chunks.iter().enumerate() {
        let marker = if scored.is_full_article_context {
            " [article context]"
        } else if scored.is_related {
            " [related]"
        } else {
            ""
        };
        println!(
            "{:2}. [{}] (score {:.3}){}",
            i + 1,
            scored.chunk.citation,
            scored.similarity,
            marker
        );
        let preview: String = scored.chunk.content.chars().take(160).collect();
        println!("    {}", preview.replace('\n', " "));
    }

    Ok(())
}
