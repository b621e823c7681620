//! LLM chunk enricher
//!
//! Asks the LLM for the full enrichment record (classifications, topics,
//! cross-references, summary, worker questions, alternative names, flags)
//! and validates every value against the fixed vocabularies. Anything the
//! validators reject is replaced by the rule-based result for that field;
//! a terminal upstream failure falls back to rule enrichment entirely. A
//! chunk is always completed, never abandoned.

use crate::chunk::Chunk;
use crate::error::Result;
use crate::ingest::enrich::{
    filter_classifications, filter_topics, ChunkEnricher, Enrichment, RuleEnricher,
};
use crate::llm::{extract_json, GenerationOptions, LLMClient};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;

const ENRICHER_SYSTEM_PROMPT: &str = r#"You are a labor contract analyst annotating contract excerpts for a retrieval system.

For the excerpt you are given, output valid JSON with this structure:
{
  "applies_to": ["job classifications this provision covers, or \"all\""],
  "topics": ["topic tags"],
  "cross_references": ["artN for each other article referenced"],
  "summary": "one sentence, at most 150 characters",
  "worker_questions": ["2-4 questions a worker would ask that this excerpt answers, in casual language"],
  "alternative_names": ["slang or informal names workers use for this provision"],
  "is_definition": false,
  "is_exception": false,
  "hire_date_sensitive": false,
  "is_high_stakes": false
}

Topics must come from: wages, overtime, scheduling, seniority, layoff, vacation, personal_holiday, sick_leave, discipline, grievance, union_security, union_rights, safety, benefits, breaks, premiums, probation, store_closing.

Classifications must come from: all, all_purpose_clerk, courtesy_clerk, head_clerk, produce_manager, bakery_manager, pharmacy_tech, cake_decorator, non_foods_clerk, sanitation_clerk, dug_shopper.

is_high_stakes is true for discipline, discharge, harassment, discrimination, safety, and representation rights. Output only JSON."#;

/// Enricher that calls the LLM with rule-based fallback
pub struct LlmEnricher {
    client: Arc<dyn LLMClient>,
    fallback: RuleEnricher,
}

impl LlmEnricher {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            fallback: RuleEnricher::new(),
        }
    }

    async fn call_with_backoff(&self, chunk: &Chunk) -> Result<String> {
        let user_prompt = format!(
            "Context: {}\nCitation: {}\n\nExcerpt:\n{}\n\nJSON:",
            chunk.parent_context, chunk.citation, chunk.content
        );
        let options = GenerationOptions {
            temperature: 0.1,
            max_tokens: 600,
            json_output: true,
            timeout: None,
        };

        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self
                .client
                .generate(ENRICHER_SYSTEM_PROMPT, &user_prompt, &options)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_rate_limit() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = Duration::from_secs(2u64 << attempt);
                    tracing::warn!(
                        "Enricher rate limited (attempt {}/{}), backing off {:?}",
                        attempt + 1,
                        MAX_ATTEMPTS,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| crate::error::StewardError::Llm("enricher retries exhausted".into())))
    }

    /// Parse and validate the LLM response; fields the validators reject are
    /// replaced by the rule-based values.
    fn parse_validated(&self, response: &str, chunk: &Chunk) -> Option<Enrichment> {
        let json_str = extract_json(response)?;
        let parsed: serde_json::Value = serde_json::from_str(json_str).ok()?;
        let rules = self.fallback.enrich_sync(chunk);

        let string_list = |key: &str| -> Vec<String> {
            parsed[key]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };

        let applies_to = {
            let filtered = filter_classifications(string_list("applies_to"));
            if filtered.is_empty() {
                rules.applies_to.clone()
            } else {
                filtered
            }
        };

        let topics = {
            let filtered = filter_topics(string_list("topics"));
            if filtered.is_empty() {
                rules.topics.clone()
            } else {
                filtered
            }
        };

        let cross_references = {
            let refs: Vec<String> = string_list("cross_references")
                .into_iter()
                .map(|r| r.to_lowercase())
                .filter(|r| {
                    r.strip_prefix("art")
                        .map(|n| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
                        .unwrap_or(false)
                })
                .collect();
            if refs.is_empty() {
                rules.cross_references.clone()
            } else {
                refs
            }
        };

        let summary = parsed["summary"]
            .as_str()
            .map(|s| {
                let trimmed = s.trim();
                if trimmed.len() > 150 {
                    let mut cut = 147;
                    while !trimmed.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    format!("{}...", &trimmed[..cut])
                } else {
                    trimmed.to_string()
                }
            })
            .filter(|s| !s.is_empty())
            .or(rules.summary.clone());

        let worker_questions: Vec<String> = string_list("worker_questions")
            .into_iter()
            .map(|q| q.to_lowercase())
            .collect();

        let alternative_names: Vec<String> = {
            let names: Vec<String> = string_list("alternative_names")
                .into_iter()
                .map(|n| n.to_lowercase())
                .collect();
            if names.is_empty() {
                rules.alternative_names.clone()
            } else {
                names
            }
        };

        let flag = |key: &str, fallback: bool| parsed[key].as_bool().unwrap_or(fallback);

        Some(Enrichment {
            applies_to,
            topics,
            cross_references,
            summary,
            worker_questions,
            alternative_names,
            is_definition: flag("is_definition", rules.is_definition),
            is_exception: flag("is_exception", rules.is_exception),
            hire_date_sensitive: flag("hire_date_sensitive", rules.hire_date_sensitive),
            is_high_stakes: flag("is_high_stakes", rules.is_high_stakes),
        })
    }
}

#[async_trait]
impl ChunkEnricher for LlmEnricher {
    async fn enrich(&self, chunk: &Chunk) -> Result<Enrichment> {
        let response = match self.call_with_backoff(chunk).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "LLM enrichment failed for {}: {}, using rule enrichment",
                    chunk.chunk_id,
                    e
                );
                return Ok(self.fallback.enrich_sync(chunk));
            }
        };

        match self.parse_validated(&response, chunk) {
            Some(enrichment) => Ok(enrichment),
            None => {
                tracing::warn!(
                    "Unparseable enrichment for {}, using rule enrichment",
                    chunk.chunk_id
                );
                Ok(self.fallback.enrich_sync(chunk))
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::DocType;
    use crate::llm::client::test_support::ScriptedClient;

    fn chunk() -> Chunk {
        Chunk {
            chunk_id: "art16_sec3".into(),
            contract_id: "test".into(),
            article_num: Some(16),
            article_title: Some("HOLIDAYS".into()),
            section_num: Some(3),
            subsection: None,
            subsection_title: None,
            citation: "Article 16, Section 3".into(),
            parent_context: "Article 16 (HOLIDAYS) > Section 3".into(),
            content: "Each employee shall be entitled to two personal holidays each \
                      contract year, scheduled per Article 14."
                .into(),
            char_count: 100,
            doc_type: DocType::Cba,
            applies_to: vec!["all".into()],
            topics: vec![],
            cross_references: vec![],
            summary: None,
            worker_questions: vec![],
            alternative_names: vec![],
            is_definition: false,
            is_exception: false,
            hire_date_sensitive: false,
            is_high_stakes: false,
        }
    }

    #[tokio::test]
    async fn test_valid_response_is_used_with_vocab_filtering() {
        let response = r#"{
            "applies_to": ["all", "made_up_job"],
            "topics": ["personal_holiday", "nonsense_topic"],
            "cross_references": ["art14", "article fourteen"],
            "summary": "Grants two personal holidays per contract year.",
            "worker_questions": ["Do I get float days?"],
            "alternative_names": ["Floater", "float day"],
            "is_definition": false,
            "is_exception": false,
            "hire_date_sensitive": false,
            "is_high_stakes": false
        }"#;
        let enricher = LlmEnricher::new(Arc::new(ScriptedClient::replying(response)));

        let enrichment = enricher.enrich(&chunk()).await.unwrap();
        assert_eq!(enrichment.applies_to, vec!["all"]);
        assert_eq!(enrichment.topics, vec!["personal_holiday"]);
        assert_eq!(enrichment.cross_references, vec!["art14"]);
        assert_eq!(enrichment.worker_questions, vec!["do i get float days?"]);
        assert!(enrichment.alternative_names.contains(&"floater".to_string()));
    }

    #[tokio::test]
    async fn test_upstream_failure_falls_back_to_rules() {
        let enricher = LlmEnricher::new(Arc::new(ScriptedClient::failing("down")));

        let enrichment = enricher.enrich(&chunk()).await.unwrap();
        // Rule enricher output: detects personal_holiday topic from content
        assert!(enrichment.topics.contains(&"personal_holiday".to_string()));
        assert_eq!(enrichment.cross_references, vec!["art14"]);
    }

    #[tokio::test]
    async fn test_garbage_response_falls_back_to_rules() {
        let enricher = LlmEnricher::new(Arc::new(ScriptedClient::replying("not json")));
        let enrichment = enricher.enrich(&chunk()).await.unwrap();
        assert!(enrichment.topics.contains(&"personal_holiday".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_then_succeeds() {
        let responses = vec![
            Err(crate::error::StewardError::ExternalError(
                "HTTP 429 rate limit".to_string(),
            )),
            Ok(r#"{"topics": ["personal_holiday"], "summary": "s"}"#.to_string()),
        ];
        let enricher = LlmEnricher::new(Arc::new(ScriptedClient::new(responses)));

        let enrichment = enricher.enrich(&chunk()).await.unwrap();
        assert_eq!(enrichment.topics, vec!["personal_holiday"]);
    }
}
