//! LLM reranker
//!
//! Rescores the top retrieved chunks by how directly they answer the
//! worker's question, then blends the LLM score with the retrieval score.
//! Runs after multi-angle merging and before article expansion. On any
//! failure the chunks come back unchanged; the reranker can degrade a
//! response's ordering, never its availability.

use crate::chunk::ScoredChunk;
use crate::config::RetrievalConfig;
use crate::llm::{extract_json, Cooldown, GenerationOptions, Interpretation, LLMClient};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of an LLM reranking pass
#[derive(Debug, Clone, Serialize)]
pub struct RerankOutcome {
    /// chunk_id -> normalized LLM score in [0,1]
    pub scores: BTreeMap<String, f64>,
    pub position_changes: usize,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RerankOutcome {
    fn skipped(error: Option<String>) -> Self {
        Self {
            scores: BTreeMap::new(),
            position_changes: 0,
            latency_ms: 0,
            success: false,
            error,
        }
    }
}

const RERANKER_SYSTEM_PROMPT: &str = r#"You are a relevance scorer for union contract document retrieval.

Your task: given a worker's question and contract excerpts, score each excerpt's relevance to answering the question.

SCORING SCALE (1-10):
- 10: Directly and completely answers the question
- 8-9: Highly relevant, contains key information needed
- 6-7: Partially relevant, provides useful context
- 4-5: Tangentially related, mentions related topics
- 1-3: Not relevant to this specific question

SCORING TIPS:
- A definition section is relevant if the question uses that term
- Procedural sections are relevant for "how do I" questions
- Exception clauses are relevant for eligibility/limit questions
- Look for SEMANTIC relevance, not just keyword matches

Output valid JSON mapping excerpt IDs to scores. Example:
{"0": 8, "1": 5, "2": 9}

Score EVERY excerpt. Do not skip any."#;

/// Reranks retrieved chunks using LLM relevance scoring
pub struct LlmReranker {
    client: Arc<dyn LLMClient>,
    cooldown: Cooldown,
}

impl LlmReranker {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            cooldown: Cooldown::new(),
        }
    }

    /// Rerank `chunks` in place. Only the first `config.reranker_max_chunks`
    /// are scored; anything beyond the cap keeps its pre-rerank order at the
    /// end of the list.
    pub async fn rerank(
        &self,
        query: &str,
        chunks: &mut Vec<ScoredChunk>,
        interpretation: Option<&Interpretation>,
        config: &RetrievalConfig,
    ) -> RerankOutcome {
        if chunks.is_empty() {
            return RerankOutcome {
                scores: BTreeMap::new(),
                position_changes: 0,
                latency_ms: 0,
                success: true,
                error: None,
            };
        }

        if self.cooldown.active() {
            return RerankOutcome::skipped(Some(
                "reranker cooling down after rate limit".to_string(),
            ));
        }

        let start = Instant::now();
        let cap = config.reranker_max_chunks.min(chunks.len());
        let timeout = config.reranker_timeout();

        let user_prompt = build_prompt(query, &chunks[..cap], interpretation, config);
        let options = GenerationOptions {
            temperature: 0.1,
            max_tokens: 1024,
            json_output: true,
            timeout: Some(timeout),
        };

        let call = self.client.generate(RERANKER_SYSTEM_PROMPT, &user_prompt, &options);
        let response = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                if e.is_rate_limit() {
                    self.cooldown.engage(Duration::from_secs(30));
                }
                tracing::warn!("Reranker failed: {}, returning original order", e);
                let mut outcome = RerankOutcome::skipped(Some(e.to_string()));
                outcome.latency_ms = start.elapsed().as_millis() as u64;
                return outcome;
            }
            Err(_) => {
                tracing::warn!("Reranker timed out after {:?}", timeout);
                let mut outcome = RerankOutcome::skipped(Some("reranker timeout".to_string()));
                outcome.latency_ms = start.elapsed().as_millis() as u64;
                return outcome;
            }
        };

        let llm_scores = parse_scores(&response, cap);

        // Blend scores on the capped prefix and re-sort it; the tail keeps
        // its pre-rerank order.
        let original_order: Vec<String> = chunks[..cap]
            .iter()
            .map(|c| c.chunk.chunk_id.clone())
            .collect();

        let mut scores = BTreeMap::new();
        for (i, scored) in chunks[..cap].iter_mut().enumerate() {
            let llm_score = llm_scores.get(&i).copied().unwrap_or(5) as f64 / 10.0;
            scored.original_similarity = Some(scored.similarity);
            scored.rerank_score = Some(llm_score);
            scored.similarity = config.reranker_original_weight * scored.similarity
                + config.reranker_llm_weight * llm_score;
            scores.insert(scored.chunk.chunk_id.clone(), llm_score);
        }
        ScoredChunk::sort_descending(&mut chunks[..cap]);

        let position_changes = chunks[..cap]
            .iter()
            .enumerate()
            .filter(|(i, c)| original_order[*i] != c.chunk.chunk_id)
            .count();

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Reranker completed: {} chunks, {}ms, {} position changes",
            cap,
            latency_ms,
            position_changes
        );

        RerankOutcome {
            scores,
            position_changes,
            latency_ms,
            success: true,
            error: None,
        }
    }
}

fn build_prompt(
    query: &str,
    chunks: &[ScoredChunk],
    interpretation: Option<&Interpretation>,
    config: &RetrievalConfig,
) -> String {
    let mut context = String::new();
    if let Some(interp) = interpretation {
        if !interp.intent.is_empty() && interp.intent != "unknown" {
            context.push_str(&format!("Intent: {}\n", interp.intent));
        }
        if !interp.key_concepts.is_empty() {
            let concepts: Vec<&str> = interp
                .key_concepts
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            context.push_str(&format!("Key concepts: {}\n", concepts.join(", ")));
        }
    }

    let mut formatted = String::new();
    for (i, scored) in chunks.iter().enumerate() {
        let content: String = if scored.chunk.content.len() > config.reranker_content_truncate {
            let mut cut = config.reranker_content_truncate;
            while !scored.chunk.content.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}...", &scored.chunk.content[..cut])
        } else {
            scored.chunk.content.clone()
        };
        formatted.push_str(&format!(
            "---\nID: {}\nCitation: {}\nContent: {}\n---\n",
            i, scored.chunk.citation, content
        ));
    }

    format!(
        "Worker's question: \"{}\"\n{}\nContract excerpts to score:\n\n{}\nJSON scores (excerpt ID -> relevance 1-10):",
        query, context, formatted
    )
}

/// Parse the index -> score map; missing or unparseable entries default to
/// 5, out-of-range values are clamped into 1..10.
fn parse_scores(response: &str, count: usize) -> BTreeMap<usize, i64> {
    let mut scores: BTreeMap<usize, i64> = BTreeMap::new();

    if let Some(json_str) = extract_json(response) {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(json_str) {
            if let Some(obj) = parsed.as_object() {
                for (key, value) in obj {
                    let index: usize = match key.parse() {
                        Ok(i) => i,
                        Err(_) => continue,
                    };
                    let score = value
                        .as_i64()
                        .or_else(|| value.as_f64().map(|f| f.round() as i64));
                    if let Some(score) = score {
                        scores.insert(index, score.clamp(1, 10));
                    }
                }
            }
        } else {
            tracing::warn!("Failed to parse reranker JSON, using default scores");
        }
    }

    for i in 0..count {
        scores.entry(i).or_insert(5);
    }
    scores
}
