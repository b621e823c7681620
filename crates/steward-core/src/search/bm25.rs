//! BM25 keyword index
//!
//! Small, deterministic BM25 built directly over the chunk corpus; no
//! full-text framework. Searchable text per document is content plus
//! citation plus article title, so "Article 12" and title words are exact
//! hits. k1 defaults above the textbook value to reward the repeated legal
//! terms that matter in contracts.

use std::collections::HashMap;

/// Default term-frequency saturation; higher than typical on purpose
pub const DEFAULT_K1: f64 = 1.8;
/// Default length normalization
pub const DEFAULT_B: f64 = 0.75;

/// Lowercase alphanumeric runs of length >= 2
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// One scored document
#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub chunk_id: String,
    pub score: f64,
}

struct DocEntry {
    chunk_id: String,
    term_freq: HashMap<String, usize>,
    length: usize,
}

/// In-memory BM25 index over the chunk corpus
pub struct Bm25Index {
    k1: f64,
    b: f64,
    docs: Vec<DocEntry>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
}

impl Bm25Index {
    /// Build the index from (chunk_id, searchable_text) pairs
    pub fn build<'a, I>(documents: I, k1: f64, b: f64) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut docs = Vec::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for (chunk_id, text) in documents {
            let tokens = tokenize(&text);
            let length = tokens.len();
            total_len += length;

            let mut term_freq: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token).or_insert(0) += 1;
            }
            for term in term_freq.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }

            docs.push(DocEntry {
                chunk_id: chunk_id.to_string(),
                term_freq,
                length,
            });
        }

        let avg_doc_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            k1,
            b,
            docs,
            doc_freq,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// IDF with additive smoothing so common terms stay non-negative
    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score every document containing any query term; return top k.
    ///
    /// `extra_terms` lets callers append slang-expansion vocabulary without
    /// rewriting the query itself.
    pub fn search(&self, query: &str, k: usize, extra_terms: &[String]) -> Vec<Bm25Hit> {
        let mut query_tokens = tokenize(query);
        for extra in extra_terms {
            query_tokens.extend(tokenize(extra));
        }
        let mut seen = std::collections::HashSet::new();
        query_tokens.retain(|t| seen.insert(t.clone()));
        if query_tokens.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<Bm25Hit> = Vec::new();
        for doc in &self.docs {
            let mut score = 0.0;
            for term in &query_tokens {
                let tf = doc.term_freq.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let idf = self.idf(term);
                let denom = tf
                    + self.k1 * (1.0 - self.b + self.b * doc.length as f64 / self.avg_doc_len);
                score += idf * tf * (self.k1 + 1.0) / denom;
            }
            if score > 0.0 {
                hits.push(Bm25Hit {
                    chunk_id: doc.chunk_id.clone(),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        hits
    }
}
