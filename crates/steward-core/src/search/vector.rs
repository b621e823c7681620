//! Vector search with metadata boosting
//!
//! Dense retrieval over the embedded corpus. Filtering is restricted to
//! stable equality filters (doc type, urgency tier); classification and
//! topic are always scored, never filtered, so a mismatched chunk loses
//! rank but stays recallable.

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::llm::Embedder;
use crate::search::ann_index::AnnIndex;
use crate::store::vectors::EmbeddingRecord;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    static ref QUERY_ARTICLE_REF: Regex = Regex::new(r"(?i)article\s*(\d+)").unwrap();
    static ref QUERY_SECTION_REF: Regex = Regex::new(r"(?i)section\s*(\d+)").unwrap();
}

/// Stable equality filters; everything else is boost-only
#[derive(Debug, Clone, Default)]
pub struct VectorFilters {
    pub doc_type: Option<String>,
    pub urgency_tier: Option<String>,
}

/// Scoring context beyond the raw query
#[derive(Debug, Clone, Default)]
pub struct VectorBoosts {
    /// Articles to boost (from concept index, manifest routing, caller)
    pub articles: Vec<u32>,
    pub classification: Option<String>,
    pub topic: Option<String>,
    pub high_stakes: bool,
}

/// One vector search hit
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub similarity: f64,
}

/// Query-side vector index for one contract snapshot
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    ann: AnnIndex,
    records: HashMap<String, EmbeddingRecord>,
}

impl VectorIndex {
    /// Build from stored embedding records
    pub fn build(embedder: Arc<dyn Embedder>, records: Vec<EmbeddingRecord>) -> Self {
        let embeddings: Vec<(String, Vec<f32>)> = records
            .iter()
            .map(|r| (r.chunk_id.clone(), r.embedding.clone()))
            .collect();
        let records = records
            .into_iter()
            .map(|r| (r.chunk_id.clone(), r))
            .collect();

        Self {
            embedder,
            ann: AnnIndex::build(embeddings),
            records,
        }
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Search the index.
    ///
    /// Over-fetches `max(k*2, 15)` neighbors, converts distance to
    /// similarity, drops hits under the similarity floor, applies additive
    /// boosts, re-sorts, truncates to k.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &VectorFilters,
        boosts: &VectorBoosts,
        config: &RetrievalConfig,
    ) -> Result<Vec<VectorHit>> {
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let fetch_n = (k * 2).max(15);
        // The ANN layer has no pre-filtering; over-fetch further when
        // equality filters will discard candidates.
        let raw_n = if filters.doc_type.is_some() || filters.urgency_tier.is_some() {
            fetch_n * 4
        } else {
            fetch_n
        };

        let article_refs: Vec<u32> = QUERY_ARTICLE_REF
            .captures_iter(query)
            .filter_map(|c| c[1].parse().ok())
            .collect();
        let section_refs: Vec<u32> = QUERY_SECTION_REF
            .captures_iter(query)
            .filter_map(|c| c[1].parse().ok())
            .collect();

        let mut hits: Vec<VectorHit> = Vec::new();
        for (chunk_id, similarity) in self.ann.search(&query_embedding, raw_n) {
            let record = match self.records.get(&chunk_id) {
                Some(record) => record,
                None => continue,
            };

            if let Some(doc_type) = &filters.doc_type {
                if &record.doc_type != doc_type {
                    continue;
                }
            }
            if let Some(tier) = &filters.urgency_tier {
                if &record.urgency_tier != tier {
                    continue;
                }
            }

            if similarity < config.similarity_floor {
                continue;
            }

            let mut adjusted = similarity;

            if let Some(article) = record.article_num {
                if article_refs.contains(&article) {
                    adjusted += config.explicit_article_boost;
                }
                if boosts.articles.contains(&article) {
                    adjusted += config.article_boost;
                }
            }
            if let Some(section) = record.section_num {
                if section_refs.contains(&section) {
                    adjusted += config.explicit_section_boost;
                }
            }

            if let Some(classification) = &boosts.classification {
                let applies_all = record.applies_to.iter().any(|c| c == "all");
                if record.applies_to.iter().any(|c| c == classification) {
                    adjusted += config.classification_boost;
                } else if !applies_all {
                    adjusted -= config.classification_penalty;
                }
            }

            if let Some(topic) = &boosts.topic {
                if record.topics.iter().any(|t| t == topic) {
                    adjusted += config.topic_boost;
                }
            }

            if boosts.high_stakes && record.urgency_tier == "high_stakes" {
                adjusted += config.high_stakes_boost;
            }

            hits.push(VectorHit {
                chunk_id,
                similarity: adjusted,
            });

            if hits.len() >= fetch_n {
                break;
            }
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Projects text onto fixed keyword axes so boost arithmetic is exact
    struct KeywordEmbedder {
        keywords: Vec<String>,
    }

    impl KeywordEmbedder {
        fn new(keywords: &[&str]) -> Self {
            Self {
                keywords: keywords.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl crate::llm::Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            let mut embedding: Vec<f32> = self
                .keywords
                .iter()
                .map(|kw| if lower.contains(kw.as_str()) { 1.0 } else { 0.0 })
                .collect();
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for value in &mut embedding {
                    *value /= magnitude;
                }
            }
            Ok(embedding)
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut results = Vec::new();
            for text in texts {
                results.push(self.embed(text).await?);
            }
            Ok(results)
        }

        fn dimensions(&self) -> usize {
            self.keywords.len()
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    fn record(
        chunk_id: &str,
        embedding: Vec<f32>,
        article: u32,
        topics: &[&str],
        applies_to: &[&str],
        high_stakes: bool,
    ) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: chunk_id.to_string(),
            embedding,
            article_num: Some(article),
            section_num: Some(1),
            doc_type: "cba".to_string(),
            urgency_tier: if high_stakes { "high_stakes" } else { "standard" }.to_string(),
            topics: topics.iter().map(|s| s.to_string()).collect(),
            applies_to: applies_to.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn index() -> VectorIndex {
        let embedder = Arc::new(KeywordEmbedder::new(&[
            "overtime", "holiday", "relief", "discharge",
        ]));
        // Embeddings in the same keyword space the test embedder produces
        let records = vec![
            record("art12_sec28", vec![1.0, 0.0, 0.0, 0.0], 12, &["overtime"], &["all"], false),
            record("art16_sec3", vec![0.0, 1.0, 0.0, 0.0], 16, &["personal_holiday"], &["all"], false),
            record(
                "art25_sec1",
                vec![0.0, 0.0, 1.0, 0.0],
                25,
                &["breaks"],
                &["courtesy_clerk"],
                false,
            ),
            record("art43_sec2", vec![0.0, 0.0, 0.0, 1.0], 43, &["discipline"], &["all"], true),
        ];
        VectorIndex::build(embedder, records)
    }

    #[tokio::test]
    async fn test_semantic_match_ranks_first() {
        let index = index();
        let hits = index
            .search(
                "overtime rules",
                2,
                &VectorFilters::default(),
                &VectorBoosts::default(),
                &RetrievalConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits[0].chunk_id, "art12_sec28");
    }

    #[tokio::test]
    async fn test_explicit_article_reference_boost() {
        let index = index();
        // Both chunks score equally on the embedding; the named article wins
        let hits = index
            .search(
                "overtime and holiday pay, check Article 16",
                2,
                &VectorFilters::default(),
                &VectorBoosts::default(),
                &RetrievalConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits[0].chunk_id, "art16_sec3");
    }

    #[tokio::test]
    async fn test_boost_articles_raise_rank() {
        let index = index();
        let boosts = VectorBoosts {
            articles: vec![25],
            ..Default::default()
        };
        let hits = index
            .search(
                "relief overtime",
                2,
                &VectorFilters::default(),
                &boosts,
                &RetrievalConfig::default(),
            )
            .await
            .unwrap();
        assert_eq!(hits[0].chunk_id, "art25_sec1");
    }

    #[tokio::test]
    async fn test_classification_mismatch_penalized_not_removed() {
        let index = index();
        let boosts = VectorBoosts {
            classification: Some("all_purpose_clerk".to_string()),
            ..Default::default()
        };
        let hits = index
            .search(
                "relief period",
                4,
                &VectorFilters::default(),
                &boosts,
                &RetrievalConfig::default(),
            )
            .await
            .unwrap();
        // art25 applies to courtesy_clerk only: penalized but still present
        assert!(hits.iter().any(|h| h.chunk_id == "art25_sec1"));
    }

    #[tokio::test]
    async fn test_applies_to_all_never_penalized() {
        let index = index();
        let boosts = VectorBoosts {
            classification: Some("courtesy_clerk".to_string()),
            ..Default::default()
        };
        let config = RetrievalConfig::default();
        let hits = index
            .search("overtime", 4, &VectorFilters::default(), &boosts, &config)
            .await
            .unwrap();

        let overtime = hits.iter().find(|h| h.chunk_id == "art12_sec28").unwrap();
        // applies_to=all: no boost, but no penalty either
        assert!(overtime.similarity >= 1.0 - 1e-6);
    }

    #[tokio::test]
    async fn test_doc_type_filter_is_equality_filter() {
        let index = index();
        let filters = VectorFilters {
            doc_type: Some("lou".to_string()),
            ..Default::default()
        };
        let hits = index
            .search(
                "overtime",
                4,
                &filters,
                &VectorBoosts::default(),
                &RetrievalConfig::default(),
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_high_stakes_boost() {
        let index = index();
        let boosts = VectorBoosts {
            high_stakes: true,
            ..Default::default()
        };
        let config = RetrievalConfig::default();
        let hits = index
            .search("discharge", 1, &VectorFilters::default(), &boosts, &config)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk_id, "art43_sec2");
        assert!(hits[0].similarity > 1.0);
    }
}
