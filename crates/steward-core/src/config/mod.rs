//! Configuration management

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Directory holding chunks/, wages/, manifests/ and the embedding store
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// LLM service configuration
    #[serde(default)]
    pub llm_service: LlmServiceConfig,

    /// Retrieval pipeline tunables
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("steward.yml")
    }

    /// Resolve the data directory (config value, else platform default)
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::DATA_DIR_NAME)
        })
    }
}

/// LLM service configuration for external inference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmServiceConfig {
    /// Base URL of the LLM service for chat/completions
    pub url: String,

    /// Model name for chat completions (interpreter, hypothesis, reranker, enricher)
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Base URL for embeddings service (can be different from LLM URL)
    #[serde(default)]
    pub embedding_url: Option<String>,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (will be auto-detected if not specified)
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    /// API key (optional, for authenticated services)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl LlmServiceConfig {
    /// Get the embeddings URL (falls back to main URL if not specified)
    pub fn embeddings_url(&self) -> &str {
        self.embedding_url.as_deref().unwrap_or(&self.url)
    }
}

impl Default for LlmServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("STEWARD_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            model: default_chat_model(),
            embedding_url: std::env::var("STEWARD_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: std::env::var("STEWARD_EMBEDDING_DIMS")
                .ok()
                .and_then(|s| s.parse().ok()),
            api_key: std::env::var("STEWARD_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    std::env::var("STEWARD_LLM_MODEL")
        .unwrap_or_else(|_| "meta-llama/Llama-3.1-8B-Instruct".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("STEWARD_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string())
}

fn default_timeout() -> u64 {
    30
}

/// Tunables for the online retrieval pipeline.
///
/// One immutable record passed through the orchestrator; each optional stage
/// reads only its own fields. All threshold constants that shape ranking are
/// here rather than hard-coded at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    // Stage switches
    pub enable_interpreter: bool,
    pub enable_hypothesis: bool,
    pub enable_title_boosting: bool,
    pub enable_reranker: bool,
    pub enable_concept_boost: bool,

    // Result shaping
    pub top_k: usize,
    pub max_search_angles: usize,
    pub max_total_chunks: usize,
    pub similarity_floor: f64,

    // Fusion
    pub rrf_k: f64,
    pub vector_weight: f64,
    pub keyword_weight: f64,
    pub bm25_k1: f64,
    pub bm25_b: f64,

    // Boosts
    pub concept_boost: f64,
    pub explicit_article_boost: f64,
    pub explicit_section_boost: f64,
    pub article_boost: f64,
    pub classification_boost: f64,
    pub classification_penalty: f64,
    pub topic_boost: f64,
    pub high_stakes_boost: f64,
    pub title_boost: f64,

    // Expansion
    pub explicit_seed_similarity: f64,
    pub full_article_threshold: usize,
    pub full_article_similarity: f64,
    pub sibling_limit: usize,
    pub sibling_similarity: f64,

    // Reranker
    pub reranker_max_chunks: usize,
    pub reranker_content_truncate: usize,
    pub reranker_original_weight: f64,
    pub reranker_llm_weight: f64,

    // Hypothesis
    pub hypothesis_max_titles: usize,

    // Stage timeouts (milliseconds)
    pub interpreter_timeout_ms: u64,
    pub reranker_timeout_ms: u64,
    pub hypothesis_timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enable_interpreter: true,
            enable_hypothesis: true,
            enable_title_boosting: true,
            enable_reranker: true,
            enable_concept_boost: true,

            top_k: 5,
            max_search_angles: 4,
            max_total_chunks: 15,
            similarity_floor: 0.1,

            rrf_k: 60.0,
            vector_weight: 1.0,
            keyword_weight: 1.0,
            bm25_k1: 1.8,
            bm25_b: 0.75,

            concept_boost: 0.03,
            explicit_article_boost: 0.30,
            explicit_section_boost: 0.10,
            article_boost: 0.20,
            classification_boost: 0.15,
            classification_penalty: 0.05,
            topic_boost: 0.15,
            high_stakes_boost: 0.10,
            title_boost: 0.5,

            explicit_seed_similarity: 0.95,
            full_article_threshold: 2,
            full_article_similarity: 0.4,
            sibling_limit: 2,
            sibling_similarity: 0.5,

            reranker_max_chunks: 15,
            reranker_content_truncate: 500,
            reranker_original_weight: 0.3,
            reranker_llm_weight: 0.7,

            hypothesis_max_titles: 3,

            interpreter_timeout_ms: 15_000,
            reranker_timeout_ms: 10_000,
            hypothesis_timeout_ms: 2_000,
        }
    }
}

impl RetrievalConfig {
    pub fn interpreter_timeout(&self) -> Duration {
        Duration::from_millis(self.interpreter_timeout_ms)
    }

    pub fn reranker_timeout(&self) -> Duration {
        Duration::from_millis(self.reranker_timeout_ms)
    }

    pub fn hypothesis_timeout(&self) -> Duration {
        Duration::from_millis(self.hypothesis_timeout_ms)
    }
}
