//! Concept index
//!
//! Pre-computed vocabulary bridges between worker phrasing and contract
//! articles: per-article aggregation of worker questions and alternative
//! names, plus reverse maps concept -> articles and question -> articles.
//! Built once after enrichment; query-time lookups are pure string work with
//! no LLM calls.

use crate::chunk::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Aggregated concepts for one article
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleConcepts {
    pub title: String,
    pub all_worker_questions: BTreeSet<String>,
    pub all_alternative_names: BTreeSet<String>,
    pub chunk_ids: Vec<String>,
}

/// Reverse indexes from worker vocabulary to article numbers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptIndex {
    pub articles: BTreeMap<u32, ArticleConcepts>,
    pub concept_to_articles: BTreeMap<String, BTreeSet<u32>>,
    pub question_to_articles: BTreeMap<String, BTreeSet<u32>>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl ConceptIndex {
    /// Build the index from enriched chunks.
    ///
    /// Chunks without an article number (LOUs, preamble) are skipped; their
    /// vocabulary has no article to route to. Deterministic: rebuilding from
    /// the same chunks serializes byte-identically.
    pub fn build(chunks: &[Chunk]) -> Self {
        let mut index = ConceptIndex::default();

        for chunk in chunks {
            let article_num = match chunk.article_num {
                Some(n) => n,
                None => continue,
            };

            let entry = index.articles.entry(article_num).or_default();
            if entry.title.is_empty() {
                if let Some(title) = &chunk.article_title {
                    entry.title = title.clone();
                }
            }
            for question in &chunk.worker_questions {
                entry.all_worker_questions.insert(normalize(question));
            }
            for name in &chunk.alternative_names {
                entry.all_alternative_names.insert(normalize(name));
            }
            entry.chunk_ids.push(chunk.chunk_id.clone());
        }

        for (article_num, concepts) in &index.articles {
            for name in &concepts.all_alternative_names {
                index
                    .concept_to_articles
                    .entry(name.clone())
                    .or_default()
                    .insert(*article_num);
            }
            for question in &concepts.all_worker_questions {
                index
                    .question_to_articles
                    .entry(question.clone())
                    .or_default()
                    .insert(*article_num);
            }
        }

        index
    }

    /// Score articles whose concepts overlap the query.
    ///
    /// Per concept key: 3 when the concept appears as a substring of the
    /// query, 2 when it equals a query token, 1 when it shares a partial
    /// substring with a token. Articles ordered by total score descending.
    pub fn find_articles_by_concept(&self, query: &str) -> Vec<u32> {
        let query_lower = query.to_lowercase();
        let tokens = tokenize(&query_lower);

        let mut scores: BTreeMap<u32, u32> = BTreeMap::new();
        for (concept, articles) in &self.concept_to_articles {
            let score = if query_lower.contains(concept.as_str()) {
                3
            } else if tokens.iter().any(|t| t == concept) {
                2
            } else if tokens
                .iter()
                .any(|t| t.len() > 3 && (concept.contains(t.as_str()) || t.contains(concept.as_str())))
            {
                1
            } else {
                0
            };

            if score > 0 {
                for article in articles {
                    *scores.entry(*article).or_insert(0) += score;
                }
            }
        }

        let mut ranked: Vec<(u32, u32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().map(|(article, _)| article).collect()
    }

    /// Match the query against indexed worker questions by token Jaccard
    /// similarity; articles with any question above 0.1 are returned ordered
    /// by their best similarity.
    pub fn find_articles_by_question(&self, query: &str) -> Vec<u32> {
        let query_tokens: BTreeSet<String> = tokenize(query).into_iter().collect();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut best: BTreeMap<u32, f64> = BTreeMap::new();
        for (question, articles) in &self.question_to_articles {
            let question_tokens: BTreeSet<String> = tokenize(question).into_iter().collect();
            if question_tokens.is_empty() {
                continue;
            }
            let intersection = query_tokens.intersection(&question_tokens).count();
            let union = query_tokens.union(&question_tokens).count();
            let similarity = intersection as f64 / union as f64;
            if similarity > 0.1 {
                for article in articles {
                    let entry = best.entry(*article).or_insert(0.0);
                    if similarity > *entry {
                        *entry = similarity;
                    }
                }
            }
        }

        let mut ranked: Vec<(u32, f64)> = best.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.into_iter().map(|(article, _)| article).collect()
    }
}
