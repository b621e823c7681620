//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(
    author,
    version,
    about = "Contract retrieval engine for union collective-bargaining agreements"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Data directory override
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest a contract document
    Ingest(IngestArgs),

    /// Ask a question against an ingested contract
    Query(QueryArgs),

    /// Deterministic wage lookup
    Wage(WageArgs),

    /// Show ingested contracts and index counts
    Status(StatusArgs),
}

#[derive(Args)]
pub struct IngestArgs {
    /// Path to the contract markdown file
    pub document: PathBuf,

    /// Contract identifier (multi-tenant key)
    #[arg(long)]
    pub contract_id: String,

    /// Manifest JSON to use instead of auto-extraction
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Enrich chunks through the configured LLM service
    #[arg(long)]
    pub llm_enrich: bool,

    /// Embed through the configured embedding service instead of the
    /// offline hash fallback
    #[arg(long)]
    pub remote_embeddings: bool,
}

#[derive(Args)]
pub struct QueryArgs {
    /// The worker's question
    pub question: Vec<String>,

    /// Contract to query
    #[arg(long)]
    pub contract_id: String,

    /// Caller's job classification
    #[arg(long)]
    pub classification: Option<String>,

    /// Total hours worked (wage progression)
    #[arg(long, default_value = "0")]
    pub hours: u32,

    /// Months employed (month-based progressions)
    #[arg(long, default_value = "0")]
    pub months: u32,

    /// Number of primary results
    #[arg(short = 'n', long, default_value = "5")]
    pub top_k: usize,

    /// Enable the LLM stages (interpreter, hypothesis, reranker)
    #[arg(long)]
    pub llm: bool,

    /// Embed the query through the configured embedding service
    #[arg(long)]
    pub remote_embeddings: bool,
}

#[derive(Args)]
pub struct WageArgs {
    /// Job classification (e.g. all_purpose_clerk)
    pub classification: String,

    /// Contract to query
    #[arg(long)]
    pub contract_id: String,

    #[arg(long, default_value = "0")]
    pub hours: u32,

    #[arg(long, default_value = "0")]
    pub months: u32,

    /// Effective date (YYYY-MM-DD; defaults to latest)
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Limit to one contract
    #[arg(long)]
    pub contract_id: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
