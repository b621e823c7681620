//! Error types for steward

use thiserror::Error;

/// Result type alias using StewardError
pub type Result<T> = std::result::Result<T, StewardError>;

/// Error type alias for convenience
pub type Error = StewardError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for steward
#[derive(Debug, Error)]
pub enum StewardError {
    #[error("Embedding store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StewardError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ContractNotFound(_) | Self::ChunkNotFound(_) => exit_codes::NOT_FOUND,
            Self::Config(_) | Self::InvalidInput(_) => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Whether this error indicates upstream rate limiting (drives backoff)
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::ExternalError(msg) | Self::Llm(msg) => {
                let lower = msg.to_lowercase();
                msg.contains("429") || lower.contains("rate") || lower.contains("quota")
            }
            _ => false,
        }
    }
}
