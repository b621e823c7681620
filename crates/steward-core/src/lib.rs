//! Steward Core Library
//!
//! Retrieval engine for union collective-bargaining agreements.
//!
//! # Features
//! - Hierarchy-aware contract parsing into citable chunks
//! - Rule-based and LLM chunk enrichment with fixed vocabularies
//! - Concept index bridging worker slang to contract articles
//! - Hybrid vector + BM25 search fused with Reciprocal Rank Fusion
//! - Multi-angle retrieval with HyDE, title boosting, and LLM reranking
//! - Deterministic wage-table extraction and lookup

pub mod chunk;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod retrieve;
pub mod route;
pub mod search;
pub mod store;

pub use chunk::{Chunk, DocType, ScoredChunk};
pub use config::{Config, LlmServiceConfig, RetrievalConfig};
pub use error::{Error, Result, StewardError};
pub use index::ConceptIndex;
pub use ingest::enrich::{ChunkEnricher, Enrichment, RuleEnricher};
pub use ingest::manifest::{extract_manifest, Manifest, QueryRouting, TopicPattern};
pub use ingest::wages::{extract_wages, WageLookup, WageTable};
pub use ingest::{ingest_contract, IngestReport};
pub use llm::{
    ChatMessage, Embedder, FallbackEmbedder, GenerationOptions, HttpEmbedder, HttpLlmClient,
    HypothesisGenerator, HypothesisOutcome, Interpretation, LLMClient, LlmEnricher, LlmReranker,
    QueryInterpreter, RerankOutcome,
};
pub use retrieve::{RetrievalResponse, RetrieveOptions, Retriever};
pub use route::{Intent, IntentClassifier, IntentType, SlangExpander};
pub use search::{Bm25Index, HybridRequest, HybridSearcher, VectorBoosts, VectorFilters, VectorIndex};
pub use store::vectors::EmbeddingStore;
pub use store::{load_snapshot, save_snapshot, ContractStore, DataLayout, Snapshot};

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "steward";

/// Default data directory name
pub const DATA_DIR_NAME: &str = "steward";
