//! Chunk data model
//!
//! A chunk is the unit of retrieval: a contiguous, citable portion of a
//! contract tagged with its Article/Section/Subsection hierarchy plus the
//! semantic metadata attached during enrichment. Chunks are immutable once
//! ingested; online code attaches scores to [`ScoredChunk`] copies only.

use serde::{Deserialize, Serialize};

/// Document type of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// Contract body (collective bargaining agreement)
    #[default]
    Cba,
    /// Letter of understanding
    Lou,
    /// Appendix (wage tables etc.)
    Appendix,
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocType::Cba => write!(f, "cba"),
            DocType::Lou => write!(f, "lou"),
            DocType::Appendix => write!(f, "appendix"),
        }
    }
}

/// A citable portion of contract text with hierarchy and enrichment metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub contract_id: String,

    // Hierarchy
    #[serde(default)]
    pub article_num: Option<u32>,
    #[serde(default)]
    pub article_title: Option<String>,
    #[serde(default)]
    pub section_num: Option<u32>,
    #[serde(default)]
    pub subsection: Option<String>,
    #[serde(default)]
    pub subsection_title: Option<String>,
    pub citation: String,
    #[serde(default)]
    pub parent_context: String,

    // Content
    pub content: String,
    #[serde(default)]
    pub char_count: usize,
    #[serde(default)]
    pub doc_type: DocType,

    // Enrichment
    #[serde(default = "default_applies_to")]
    pub applies_to: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub cross_references: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub worker_questions: Vec<String>,
    #[serde(default)]
    pub alternative_names: Vec<String>,
    #[serde(default)]
    pub is_definition: bool,
    #[serde(default)]
    pub is_exception: bool,
    #[serde(default)]
    pub hire_date_sensitive: bool,
    #[serde(default)]
    pub is_high_stakes: bool,
}

fn default_applies_to() -> Vec<String> {
    vec!["all".to_string()]
}

impl Chunk {
    /// Whether this chunk applies to every classification
    pub fn applies_to_all(&self) -> bool {
        self.applies_to.iter().any(|c| c == "all")
    }

    /// Urgency tier string used as a stable equality filter in the vector store
    pub fn urgency_tier(&self) -> &'static str {
        if self.is_high_stakes {
            "high_stakes"
        } else {
            "standard"
        }
    }
}

/// Render the canonical citation string from hierarchy fields.
///
/// The citation is a pure function of (article_num, section_num, subsection,
/// subsection_title); re-rendering from those fields must reproduce the
/// stored citation exactly.
pub fn render_citation(
    article_num: Option<u32>,
    section_num: Option<u32>,
    subsection: Option<&str>,
    subsection_title: Option<&str>,
) -> String {
    let mut citation = match article_num {
        Some(n) => format!("Article {}", n),
        None => String::new(),
    };
    if let Some(sec) = section_num {
        citation.push_str(&format!(", Section {}", sec));
    }
    match (subsection, subsection_title) {
        (Some(sub), Some(title)) => {
            citation.push_str(&format!(", Subsection {} ({})", sub, title));
        }
        (Some(sub), None) => {
            citation.push_str(&format!(", Part {}", sub));
        }
        _ => {}
    }
    citation
}

/// Render the breadcrumb injected ahead of chunk content in prompts
pub fn render_parent_context(
    article_num: Option<u32>,
    article_title: Option<&str>,
    section_num: Option<u32>,
    section_title: Option<&str>,
    subsection: Option<&str>,
    subsection_title: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if let Some(n) = article_num {
        match article_title {
            Some(t) => parts.push(format!("Article {} ({})", n, t)),
            None => parts.push(format!("Article {}", n)),
        }
    }
    if let Some(sec) = section_num {
        match section_title {
            Some(t) => parts.push(format!("Section {} ({})", sec, t)),
            None => parts.push(format!("Section {}", sec)),
        }
    }
    if let (Some(sub), Some(title)) = (subsection, subsection_title) {
        parts.push(format!("Subsection {} ({})", sub, title));
    }
    parts.join(" > ")
}

/// A chunk annotated with per-request retrieval scores.
///
/// Canonical chunk records are never mutated during retrieval; every ranking
/// stage works on these copies.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Current blended score; mutated as boosts/reranking apply
    pub similarity: f64,
    pub vector_score: f64,
    pub keyword_score: f64,
    pub rrf_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_rank: Option<usize>,
    /// Which search angle produced this chunk (e.g. "explicit_article_2")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_angle: Option<String>,
    /// Sibling-section supplemental context
    pub is_related: bool,
    /// Added by full-article expansion
    pub is_full_article_context: bool,
    /// Article title matched a hypothesized section title
    pub hypothesis_matched: bool,
    /// Similarity before reranking (set by the reranker)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_similarity: Option<f64>,
    /// Normalized LLM relevance score (set by the reranker)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl ScoredChunk {
    /// Wrap a chunk with an initial similarity score
    pub fn new(chunk: Chunk, similarity: f64) -> Self {
        Self {
            chunk,
            similarity,
            vector_score: 0.0,
            keyword_score: 0.0,
            rrf_score: 0.0,
            vector_rank: None,
            keyword_rank: None,
            search_angle: None,
            is_related: false,
            is_full_article_context: false,
            hypothesis_matched: false,
            original_similarity: None,
            rerank_score: None,
        }
    }

    /// Sort key: score descending with chunk_id as deterministic tie-break
    pub fn sort_descending(chunks: &mut [ScoredChunk]) {
        chunks.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
    }
}
