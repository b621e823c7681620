//! Query interpreter
//!
//! Deep semantic analysis ahead of retrieval: intent, key concepts,
//! hypothetical contract-style answers (HyDE), alternative search phrasings,
//! likely section titles, and explicit article references. Explicit articles
//! are also extracted deterministically by regex so a failed LLM call never
//! loses them; on any failure the interpreter emits a minimal interpretation
//! and retrieval proceeds.

use crate::error::Result;
use crate::llm::{extract_json, Cooldown, GenerationOptions, LLMClient};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

lazy_static! {
    static ref EXPLICIT_ARTICLE: Regex = Regex::new(r"(?i)\bart(?:icle)?\.?\s*(\d+)").unwrap();
}

/// Structured interpretation of a worker query
#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    pub original_query: String,
    pub intent: String,
    pub key_concepts: Vec<String>,
    pub entities: BTreeMap<String, String>,
    pub hypothetical_answers: Vec<String>,
    pub search_queries: Vec<String>,
    pub likely_sections: Vec<String>,
    pub explicit_articles: Vec<u32>,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Interpretation {
    /// Minimal interpretation: the original query as the only search angle
    /// plus regex-extracted explicit articles.
    fn minimal(query: &str, explicit_articles: Vec<u32>, error: Option<String>) -> Self {
        Self {
            original_query: query.to_string(),
            intent: "unknown".to_string(),
            key_concepts: Vec::new(),
            entities: BTreeMap::new(),
            hypothetical_answers: Vec::new(),
            search_queries: vec![query.to_string()],
            likely_sections: Vec::new(),
            explicit_articles,
            latency_ms: 0,
            success: false,
            error,
        }
    }

    /// Interpretation used when the interpreter stage is disabled: the
    /// original query as the only angle, explicit articles from regex.
    pub fn passthrough(query: &str) -> Self {
        let mut interp = Self::minimal(query, extract_explicit_articles(query), None);
        interp.success = true;
        interp
    }

    /// All search angles in priority order (original, hypothetical answers,
    /// alternative queries), deduplicated and capped.
    pub fn all_search_queries(&self, cap: usize) -> Vec<String> {
        let mut queries = vec![self.original_query.clone()];

        for hypothesis in &self.hypothetical_answers {
            if !hypothesis.is_empty() && !queries.contains(hypothesis) {
                queries.push(hypothesis.clone());
            }
        }
        for query in &self.search_queries {
            if !query.is_empty() && !queries.contains(query) {
                queries.push(query.clone());
            }
        }

        queries.truncate(cap);
        queries
    }

    /// Whether a given angle text is one of the hypothetical answers
    pub fn is_hypothetical(&self, angle: &str) -> bool {
        self.hypothetical_answers.iter().any(|h| h == angle)
    }
}

/// Extract explicit article references ("Article 12", "art. 12") by regex
pub fn extract_explicit_articles(query: &str) -> Vec<u32> {
    let mut articles: Vec<u32> = EXPLICIT_ARTICLE
        .captures_iter(query)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    articles.sort_unstable();
    articles.dedup();
    articles
}

const INTERPRETER_SYSTEM_PROMPT: &str = r#"You are a union contract expert who helps interpret worker questions.

Your task: analyze a worker's question and extract structured information to help find the answer in a collective bargaining agreement.

You must output valid JSON with this exact structure:
{
  "intent": "brief description of what they want to know",
  "key_concepts": ["list", "of", "main", "concepts"],
  "entities": {"type": "value"},
  "hypothetical_answers": [
    "What the contract text might say if it answers this question. Write 1-2 sentences that SOUND like contract language."
  ],
  "search_queries": [
    "2-3 different ways to search for this information",
    "using different vocabulary and angles"
  ],
  "likely_sections": ["Section titles that might contain the answer"],
  "explicit_articles": [article numbers if mentioned, empty otherwise]
}

CRITICAL RULES:
1. hypothetical_answers must sound like LEGAL CONTRACT TEXT, not casual speech
2. search_queries must use BOTH worker slang AND formal contract terms
3. If the query mentions "Article X" explicitly, include X in explicit_articles
4. Think about what SECTION TITLES in a union contract would contain this info

VOCABULARY GUIDE (worker term -> contract term):
- vendor/vendor work -> recognition, work jurisdiction, bargaining unit work
- fired/canned -> discharge, termination
- write up -> discipline, warning
- break -> rest period, relief period
- overtime/OT -> overtime, premium pay
- floater -> personal holiday
- steward/rep -> union representative"#;

/// Multi-angle query interpreter backed by an LLM
pub struct QueryInterpreter {
    client: Arc<dyn LLMClient>,
    timeout: Duration,
    cooldown: Cooldown,
}

impl QueryInterpreter {
    pub fn new(client: Arc<dyn LLMClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            cooldown: Cooldown::new(),
        }
    }

    /// Interpret a worker query. Never fails: on parse failure, timeout, or
    /// upstream error the minimal interpretation is returned with
    /// `success=false` and the error recorded.
    pub async fn interpret(&self, query: &str) -> Interpretation {
        let start = Instant::now();
        let explicit_articles = extract_explicit_articles(query);

        if self.cooldown.active() {
            return Interpretation::minimal(
                query,
                explicit_articles,
                Some("interpreter cooling down after rate limit".to_string()),
            );
        }

        let user_prompt = format!(
            "Analyze this worker question and output JSON:\n\nQuestion: \"{}\"\n\nJSON:",
            query
        );
        let options = GenerationOptions {
            temperature: 0.2,
            max_tokens: 500,
            json_output: true,
            timeout: Some(self.timeout),
        };

        let call = self
            .client
            .generate(INTERPRETER_SYSTEM_PROMPT, &user_prompt, &options);

        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                if e.is_rate_limit() {
                    self.cooldown.engage(Duration::from_secs(30));
                }
                tracing::warn!("Interpreter call failed: {}", e);
                let mut interp =
                    Interpretation::minimal(query, explicit_articles, Some(e.to_string()));
                interp.latency_ms = start.elapsed().as_millis() as u64;
                return interp;
            }
            Err(_) => {
                tracing::warn!("Interpreter timed out after {:?}", self.timeout);
                let mut interp = Interpretation::minimal(
                    query,
                    explicit_articles,
                    Some("interpreter timeout".to_string()),
                );
                interp.latency_ms = start.elapsed().as_millis() as u64;
                return interp;
            }
        };

        match self.parse_response(&response, query, explicit_articles.clone()) {
            Ok(mut interpretation) => {
                interpretation.latency_ms = start.elapsed().as_millis() as u64;
                interpretation
            }
            Err(e) => {
                tracing::warn!("Failed to parse interpreter JSON: {}", e);
                tracing::debug!("Raw interpreter response: {}", response);
                let mut interp =
                    Interpretation::minimal(query, explicit_articles, Some(e.to_string()));
                interp.latency_ms = start.elapsed().as_millis() as u64;
                interp
            }
        }
    }

    fn parse_response(
        &self,
        response: &str,
        query: &str,
        regex_articles: Vec<u32>,
    ) -> Result<Interpretation> {
        let json_str = extract_json(response)
            .ok_or_else(|| crate::error::StewardError::Llm("no JSON in response".to_string()))?;
        let parsed: serde_json::Value = serde_json::from_str(json_str)?;

        let string_list = |key: &str| -> Vec<String> {
            parsed[key]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let entities: BTreeMap<String, String> = parsed["entities"]
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        // Merge regex-extracted articles with the LLM's list
        let mut explicit_articles = regex_articles;
        if let Some(arr) = parsed["explicit_articles"].as_array() {
            for value in arr {
                let parsed_num = value
                    .as_u64()
                    .map(|n| n as u32)
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()));
                if let Some(num) = parsed_num {
                    explicit_articles.push(num);
                }
            }
        }
        explicit_articles.sort_unstable();
        explicit_articles.dedup();

        let mut search_queries = string_list("search_queries");
        if search_queries.is_empty() {
            search_queries.push(query.to_string());
        }

        Ok(Interpretation {
            original_query: query.to_string(),
            intent: parsed["intent"].as_str().unwrap_or("unknown").to_string(),
            key_concepts: string_list("key_concepts"),
            entities,
            hypothetical_answers: string_list("hypothetical_answers"),
            search_queries,
            likely_sections: string_list("likely_sections"),
            explicit_articles,
            latency_ms: 0,
            success: true,
            error: None,
        })
    }
}
