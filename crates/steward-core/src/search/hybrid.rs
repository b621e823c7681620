//! Hybrid search
//!
//! One search angle through both retrieval legs: the vector query and the
//! BM25 query run concurrently, their rankings fuse via RRF, and
//! concept-derived article boosts nudge the fused order. The +0.03 concept
//! boost is intentionally larger than a typical RRF delta so a
//! topic-relevant article can surface from below.

use crate::chunk::ScoredChunk;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::route::slang::SlangExpander;
use crate::search::bm25::Bm25Index;
use crate::search::rrf::rrf_fuse;
use crate::search::vector::{VectorBoosts, VectorFilters, VectorIndex};
use crate::store::Snapshot;

/// One hybrid search request
#[derive(Debug, Clone, Default)]
pub struct HybridRequest {
    pub query: String,
    pub k: usize,
    pub filters: VectorFilters,
    pub boosts: VectorBoosts,
    /// Query run through the concept index for article boosting; usually the
    /// worker's original phrasing even when `query` is an expanded angle
    pub concept_query: Option<String>,
}

/// Per-request view over one snapshot's indexes
pub struct HybridSearcher<'a> {
    pub snapshot: &'a Snapshot,
    pub bm25: &'a Bm25Index,
    pub vector: &'a VectorIndex,
    pub slang: &'a SlangExpander,
    pub config: &'a RetrievalConfig,
}

impl<'a> HybridSearcher<'a> {
    /// Run the full hybrid pipeline for one angle.
    pub async fn search(&self, request: &HybridRequest) -> Result<Vec<ScoredChunk>> {
        let mut boosts = request.boosts.clone();

        // Concept-index bridge: worker vocabulary and stored worker
        // questions -> article numbers, unioned with the caller's boost list.
        if self.config.enable_concept_boost {
            if let Some(concept_query) = &request.concept_query {
                let concept_index = &self.snapshot.concept_index;
                let bridged = concept_index
                    .find_articles_by_concept(concept_query)
                    .into_iter()
                    .chain(concept_index.find_articles_by_question(concept_query));
                for article in bridged {
                    if !boosts.articles.contains(&article) {
                        boosts.articles.push(article);
                    }
                }
            }
        }

        let fetch_k = request.k * 2;
        let expansion_terms = self.slang.expansion_terms(&request.query);

        let (vector_hits, keyword_hits) = tokio::join!(
            self.vector.search(
                &request.query,
                fetch_k,
                &request.filters,
                &boosts,
                self.config,
            ),
            async { self.bm25.search(&request.query, fetch_k, &expansion_terms) },
        );
        let vector_hits = vector_hits?;

        let vector_ranked: Vec<(String, f64)> = vector_hits
            .into_iter()
            .map(|h| (h.chunk_id, h.similarity))
            .collect();
        let keyword_ranked: Vec<(String, f64)> = keyword_hits
            .into_iter()
            .map(|h| (h.chunk_id, h.score))
            .collect();

        let fused = rrf_fuse(
            &vector_ranked,
            &keyword_ranked,
            self.config.rrf_k,
            self.config.vector_weight,
            self.config.keyword_weight,
        );

        let mut results: Vec<ScoredChunk> = Vec::new();
        for hit in fused {
            let chunk = match self.snapshot.chunk(&hit.chunk_id) {
                Some(chunk) => chunk,
                None => continue,
            };
            let mut scored = ScoredChunk::new(chunk.as_ref().clone(), hit.rrf_score);
            scored.rrf_score = hit.rrf_score;
            scored.vector_score = hit.vector_score;
            scored.keyword_score = hit.keyword_score;
            scored.vector_rank = hit.vector_rank;
            scored.keyword_rank = hit.keyword_rank;

            // Post-fusion concept/article boost
            if let Some(article) = scored.chunk.article_num {
                if boosts.articles.contains(&article) {
                    scored.similarity += self.config.concept_boost;
                }
            }

            results.push(scored);
        }

        ScoredChunk::sort_descending(&mut results);
        results.truncate(request.k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, DocType};
    use crate::index::concept::ConceptIndex;
    use crate::ingest::manifest::Manifest;
    use crate::ingest::wages::WageTable;
    use crate::llm::{Embedder, FallbackEmbedder};
    use crate::store::vectors::EmbeddingRecord;
    use std::sync::Arc;

    fn chunk(id: &str, article: u32, title: &str, content: &str, names: &[&str]) -> Chunk {
        Chunk {
            chunk_id: id.into(),
            contract_id: "test".into(),
            article_num: Some(article),
            article_title: Some(title.into()),
            section_num: Some(1),
            subsection: None,
            subsection_title: None,
            citation: format!("Article {}, Section 1", article),
            parent_context: String::new(),
            content: content.into(),
            char_count: content.len(),
            doc_type: DocType::Cba,
            applies_to: vec!["all".into()],
            topics: vec![],
            cross_references: vec![],
            summary: None,
            worker_questions: vec![],
            alternative_names: names.iter().map(|s| s.to_string()).collect(),
            is_definition: false,
            is_exception: false,
            hire_date_sensitive: false,
            is_high_stakes: false,
        }
    }

    async fn build_fixture() -> (Snapshot, Bm25Index, VectorIndex, SlangExpander) {
        let chunks = vec![
            chunk(
                "art12_sec1",
                12,
                "HOURS OF WORK",
                "Overtime shall be paid at time and one-half for work in excess \
                 of eight hours per day or forty hours per week.",
                &[],
            ),
            chunk(
                "art25_sec1",
                25,
                "RELIEF PERIODS",
                "A relief period of fifteen minutes shall be provided for each \
                 four hours worked.",
                &["break"],
            ),
            chunk(
                "art16_sec1",
                16,
                "HOLIDAYS",
                "Each employee shall receive two personal holidays per contract \
                 year.",
                &["floater", "float day"],
            ),
        ];

        let concept_index = ConceptIndex::build(&chunks);
        let embedder: Arc<dyn Embedder> = Arc::new(FallbackEmbedder::new(128));

        let mut records = Vec::new();
        for c in &chunks {
            let embedding = embedder.embed(&c.content).await.unwrap();
            records.push(EmbeddingRecord {
                chunk_id: c.chunk_id.clone(),
                embedding,
                article_num: c.article_num,
                section_num: c.section_num,
                doc_type: "cba".into(),
                urgency_tier: "standard".into(),
                topics: c.topics.clone(),
                applies_to: c.applies_to.clone(),
            });
        }

        let bm25 = Bm25Index::build(
            chunks
                .iter()
                .map(|c| (c.chunk_id.as_str(), Snapshot::searchable_text(c))),
            1.8,
            0.75,
        );
        let vector = VectorIndex::build(embedder, records);
        let snapshot = Snapshot::new(
            "test",
            chunks,
            concept_index,
            Manifest::default(),
            WageTable::default(),
            0,
        );
        (snapshot, bm25, vector, SlangExpander::new())
    }

    #[tokio::test]
    async fn test_hybrid_finds_keyword_match() {
        let (snapshot, bm25, vector, slang) = build_fixture().await;
        let config = RetrievalConfig::default();
        let searcher = HybridSearcher {
            snapshot: &snapshot,
            bm25: &bm25,
            vector: &vector,
            slang: &slang,
            config: &config,
        };

        let results = searcher
            .search(&HybridRequest {
                query: "overtime pay in excess of forty hours".into(),
                k: 3,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.chunk_id, "art12_sec1");
        assert!(results[0].keyword_rank.is_some());
        assert!(results[0].rrf_score > 0.0);
    }

    #[tokio::test]
    async fn test_concept_boost_surfaces_vocabulary_bridge() {
        let (snapshot, bm25, vector, slang) = build_fixture().await;
        let config = RetrievalConfig::default();
        let searcher = HybridSearcher {
            snapshot: &snapshot,
            bm25: &bm25,
            vector: &vector,
            slang: &slang,
            config: &config,
        };

        // "break" appears nowhere in the corpus text, only as an alternative
        // name on Article 25; the concept index must bridge it.
        let results = searcher
            .search(&HybridRequest {
                query: "when do I get a break?".into(),
                k: 3,
                concept_query: Some("when do I get a break?".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.chunk_id, "art25_sec1");
    }

    #[tokio::test]
    async fn test_caller_boost_articles_apply_post_fusion() {
        let (snapshot, bm25, vector, slang) = build_fixture().await;
        let config = RetrievalConfig::default();
        let searcher = HybridSearcher {
            snapshot: &snapshot,
            bm25: &bm25,
            vector: &vector,
            slang: &slang,
            config: &config,
        };

        let boosted = searcher
            .search(&HybridRequest {
                query: "hours worked each week".into(),
                k: 3,
                boosts: VectorBoosts {
                    articles: vec![16],
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        let art16 = boosted.iter().find(|r| r.chunk.article_num == Some(16));
        if let Some(result) = art16 {
            // Boost applied on top of the fused score
            assert!(result.similarity >= result.rrf_score + config.concept_boost - 1e-9);
        }
    }

    #[tokio::test]
    async fn test_results_capped_at_k() {
        let (snapshot, bm25, vector, slang) = build_fixture().await;
        let config = RetrievalConfig::default();
        let searcher = HybridSearcher {
            snapshot: &snapshot,
            bm25: &bm25,
            vector: &vector,
            slang: &slang,
            config: &config,
        };

        let results = searcher
            .search(&HybridRequest {
                query: "shall be provided each employee hours".into(),
                k: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(results.len() <= 1);
    }
}
