//! Hypothesis layer
//!
//! Pre-retrieval reasoning: predict which section TITLES in the contract
//! would contain the answer, bridging worker vocabulary and legal headings
//! ("break" -> "Relief Periods"). The titles are appended to the search query
//! and later boost chunks whose article title matches a hypothesis. Failure
//! leaves retrieval running on the unexpanded query.

use crate::chunk::ScoredChunk;
use crate::llm::{Cooldown, GenerationOptions, LLMClient};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of hypothesis generation
#[derive(Debug, Clone, Serialize)]
pub struct HypothesisOutcome {
    pub titles: Vec<String>,
    /// Original query with hypothesized terms appended
    pub expanded_query: String,
    pub latency_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HypothesisOutcome {
    fn unexpanded(query: &str, error: Option<String>) -> Self {
        Self {
            titles: Vec::new(),
            expanded_query: query.to_string(),
            latency_ms: 0,
            success: false,
            error,
        }
    }
}

const HYPOTHESIS_SYSTEM_PROMPT: &str = r#"You are a labor law expert who specializes in union collective bargaining agreements.

Your task: given a worker's question, predict which section TITLES in a union contract would contain the answer.

Union contracts use formal legal terminology. Workers often use informal language.

Examples of vocabulary mapping:
- "break" -> "Relief Periods", "Rest Periods", "Meal Periods"
- "fired" -> "Discharge", "Termination", "Just Cause"
- "pay raise" -> "Wage Progression", "Step Increases", "Wages"
- "laid off" -> "Layoff", "Reduction in Force", "Recall Rights"
- "vacation" -> "Vacations", "Vacation Pay", "Time Off"
- "union rep" -> "Stewards", "Union Representation", "Weingarten Rights"

Output ONLY the section titles, one per line, no numbers or bullets, ordered by likelihood of containing the answer."#;

/// Generates hypothesized section titles via one fast LLM call
pub struct HypothesisGenerator {
    client: Arc<dyn LLMClient>,
    max_titles: usize,
    timeout: Duration,
    cooldown: Cooldown,
}

impl HypothesisGenerator {
    pub fn new(client: Arc<dyn LLMClient>, max_titles: usize, timeout: Duration) -> Self {
        Self {
            client,
            max_titles,
            timeout,
            cooldown: Cooldown::new(),
        }
    }

    /// Predict section titles for the query. Never fails; on any error the
    /// outcome carries the unexpanded query with `success=false`.
    pub async fn generate(&self, query: &str) -> HypothesisOutcome {
        let start = Instant::now();

        if self.cooldown.active() {
            return HypothesisOutcome::unexpanded(
                query,
                Some("hypothesis layer cooling down after rate limit".to_string()),
            );
        }

        let user_prompt = format!(
            "Worker's question: \"{}\"\n\nList {} likely section titles that would contain this answer:",
            query, self.max_titles
        );
        let options = GenerationOptions {
            temperature: 0.3,
            max_tokens: 100,
            json_output: false,
            timeout: Some(self.timeout),
        };

        let call = self
            .client
            .generate(HYPOTHESIS_SYSTEM_PROMPT, &user_prompt, &options);

        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                if e.is_rate_limit() {
                    self.cooldown.engage(Duration::from_secs(30));
                }
                tracing::warn!("Hypothesis call failed: {}", e);
                let mut outcome = HypothesisOutcome::unexpanded(query, Some(e.to_string()));
                outcome.latency_ms = start.elapsed().as_millis() as u64;
                return outcome;
            }
            Err(_) => {
                tracing::debug!("Hypothesis timed out after {:?}", self.timeout);
                let mut outcome = HypothesisOutcome::unexpanded(
                    query,
                    Some("hypothesis timeout".to_string()),
                );
                outcome.latency_ms = start.elapsed().as_millis() as u64;
                return outcome;
            }
        };

        let titles: Vec<String> = response
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|line| line.len() > 2)
            .map(str::to_string)
            .take(self.max_titles)
            .collect();

        let expanded_query = if titles.is_empty() {
            query.to_string()
        } else {
            format!("{} ({})", query, titles.join(" "))
        };

        HypothesisOutcome {
            titles,
            expanded_query,
            latency_ms: start.elapsed().as_millis() as u64,
            success: true,
            error: None,
        }
    }
}

/// Boost chunks whose article title is a word-set match with any hypothesized
/// title, then re-sort. Word-set matching: all significant words of the
/// hypothesis appear in the title, or the title's leading words all appear in
/// the hypothesis, or one contains the other outright.
pub fn apply_title_boosting(
    chunks: &mut Vec<ScoredChunk>,
    titles: &[String],
    boost: f64,
) {
    if titles.is_empty() || chunks.is_empty() {
        return;
    }

    let normalized: Vec<String> = titles.iter().map(|t| t.trim().to_lowercase()).collect();

    for scored in chunks.iter_mut() {
        let article_title = match &scored.chunk.article_title {
            Some(title) => title.to_lowercase(),
            None => continue,
        };

        let matched = normalized.iter().any(|hypothesis| {
            let hypothesis_words: Vec<&str> =
                hypothesis.split_whitespace().filter(|w| w.len() > 2).collect();
            if !hypothesis_words.is_empty()
                && hypothesis_words.iter().all(|w| article_title.contains(w))
            {
                return true;
            }
            let title_words: Vec<&str> =
                article_title.split_whitespace().filter(|w| w.len() > 2).collect();
            if title_words.len() >= 2 && title_words[..2].iter().all(|w| hypothesis.contains(w)) {
                return true;
            }
            hypothesis.contains(&article_title) || article_title.contains(hypothesis.as_str())
        });

        if matched {
            scored.similarity += boost;
            scored.hypothesis_matched = true;
        }
    }

    ScoredChunk::sort_descending(chunks);
}
