//! LLM collaborators
//!
//! The retrieval pipeline leans on four narrow LLM-backed stages: the query
//! interpreter, the hypothesis layer, the reranker, and the enricher. Each
//! depends only on the [`LLMClient`] trait and degrades gracefully when the
//! service misbehaves.

mod client;
mod embedder;
mod enricher;
mod hypothesis;
mod interpreter;
mod reranker;

pub use client::{ChatMessage, GenerationOptions, HttpLlmClient, LLMClient};
pub use embedder::{Embedder, FallbackEmbedder, HttpEmbedder};
pub use enricher::LlmEnricher;
pub use hypothesis::{apply_title_boosting, HypothesisGenerator, HypothesisOutcome};
pub use interpreter::{Interpretation, QueryInterpreter};
pub use reranker::{LlmReranker, RerankOutcome};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Extract the JSON object from an LLM response, tolerating markdown code
/// fences and thinking preambles.
pub(crate) fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end > start {
        Some(&response[start..=end])
    } else {
        None
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Bypass window entered after a stage exhausts its rate-limit retries.
/// While active, the stage skips its LLM call entirely.
#[derive(Debug, Default)]
pub struct Cooldown {
    until_millis: AtomicU64,
}

impl Cooldown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> bool {
        now_millis() < self.until_millis.load(Ordering::Relaxed)
    }

    pub fn engage(&self, duration: Duration) {
        self.until_millis
            .store(now_millis() + duration.as_millis() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_strips_fences_and_preamble() {
        let response = "Here are the scores:\n```json\n{\"0\": 8}\n```\n";
        assert_eq!(extract_json(response), Some("{\"0\": 8}"));
    }

    #[test]
    fn test_extract_json_none_without_braces() {
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_cooldown_engages_and_expires() {
        let cooldown = Cooldown::new();
        assert!(!cooldown.active());
        cooldown.engage(Duration::from_secs(60));
        assert!(cooldown.active());
        cooldown.engage(Duration::from_millis(0));
        assert!(!cooldown.active());
    }
}
