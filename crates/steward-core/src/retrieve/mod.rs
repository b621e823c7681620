//! Retrieval orchestrator
//!
//! The top-level online operation: interpret the query into search angles,
//! fan the angles out across the hybrid and vector indexes, merge per chunk
//! id on max score, rerank, widen to full articles and sibling sections, and
//! join the wage lookup. Every optional stage is independently guarded; a
//! request fails only if retrieval itself has nothing to run against.

use crate::chunk::ScoredChunk;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::ingest::wages::WageLookup;
use crate::llm::{
    apply_title_boosting, Embedder, HypothesisGenerator, HypothesisOutcome, Interpretation,
    LLMClient, LlmReranker, QueryInterpreter, RerankOutcome,
};
use crate::route::{Intent, IntentClassifier, IntentType, SlangExpander};
use crate::search::{
    Bm25Index, HybridRequest, HybridSearcher, VectorBoosts, VectorFilters, VectorIndex,
};
use crate::store::vectors::EmbeddingRecord;
use crate::store::{ContractStore, Snapshot};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Bounded fan-out across search angles
const ANGLE_CONCURRENCY: usize = 3;

/// Per-request options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    /// Caller-known job classification; overrides detection in the query
    pub classification: Option<String>,
    pub hours_worked: u32,
    pub months_employed: u32,
    pub effective_date: Option<String>,
    /// Override the configured top_k for this request
    pub top_k: Option<usize>,
}

/// Full retrieval response
#[derive(Debug, Serialize)]
pub struct RetrievalResponse {
    pub chunks: Vec<ScoredChunk>,
    pub wage_info: Option<WageLookup>,
    pub intent: Intent,
    pub escalation_required: bool,
    pub interpretation: Interpretation,
    pub hypothesis_result: Option<HypothesisOutcome>,
    pub reranker_result: Option<RerankOutcome>,
    pub search_angles_used: usize,
    pub explicit_articles_fetched: Vec<u32>,
    pub generation: u64,
}

/// Indexes and routing state derived from one snapshot generation.
/// Rebuilt whole on re-ingestion; never mutated in place.
pub struct EngineState {
    pub snapshot: Arc<Snapshot>,
    bm25: Bm25Index,
    vector: VectorIndex,
    slang: SlangExpander,
    classifier: IntentClassifier,
}

impl EngineState {
    pub fn build(
        snapshot: Arc<Snapshot>,
        embedder: Arc<dyn Embedder>,
        records: Vec<EmbeddingRecord>,
        config: &RetrievalConfig,
    ) -> Self {
        let bm25 = Bm25Index::build(
            snapshot
                .chunks
                .iter()
                .map(|c| (c.chunk_id.as_str(), Snapshot::searchable_text(c))),
            config.bm25_k1,
            config.bm25_b,
        );
        let vector = VectorIndex::build(embedder, records);
        let slang = SlangExpander::with_manifest_layer(&snapshot.manifest);
        let classifier = IntentClassifier::new(snapshot.manifest.clone());

        Self {
            snapshot,
            bm25,
            vector,
            slang,
            classifier,
        }
    }
}

/// Stateless-per-request retrieval entry point over a swappable engine
pub struct Retriever {
    store: ContractStore,
    state: RwLock<Arc<EngineState>>,
    embedder: Arc<dyn Embedder>,
    interpreter: Option<QueryInterpreter>,
    hypothesis: Option<HypothesisGenerator>,
    reranker: Option<LlmReranker>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Assemble a retriever. `llm` enables the interpreter, hypothesis, and
    /// reranker stages; without it those stages are skipped (the config
    /// switches can also disable them individually).
    pub fn new(
        snapshot: Snapshot,
        records: Vec<EmbeddingRecord>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LLMClient>>,
        config: RetrievalConfig,
    ) -> Self {
        let store = ContractStore::new(snapshot);
        let state = RwLock::new(Arc::new(EngineState::build(
            store.snapshot(),
            Arc::clone(&embedder),
            records,
            &config,
        )));

        let interpreter = llm
            .as_ref()
            .map(|client| QueryInterpreter::new(Arc::clone(client), config.interpreter_timeout()));
        let hypothesis = llm.as_ref().map(|client| {
            HypothesisGenerator::new(
                Arc::clone(client),
                config.hypothesis_max_titles,
                config.hypothesis_timeout(),
            )
        });
        let reranker = llm.map(LlmReranker::new);

        Self {
            store,
            state,
            embedder,
            interpreter,
            hypothesis,
            reranker,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The snapshot currently serving requests
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// Publish a newly ingested snapshot: indexes are rebuilt first, then
    /// the engine pointer flips. In-flight requests keep their generation.
    pub fn publish(&self, snapshot: Snapshot, records: Vec<EmbeddingRecord>) -> u64 {
        let generation = self.store.publish(snapshot);
        let engine = EngineState::build(
            self.store.snapshot(),
            Arc::clone(&self.embedder),
            records,
            &self.config,
        );
        *self.state.write().expect("engine lock poisoned") = Arc::new(engine);
        generation
    }

    /// Deterministic wage lookup against the current snapshot
    pub fn lookup_wage(
        &self,
        classification: &str,
        hours_worked: u32,
        months_employed: u32,
        effective_date: Option<&str>,
    ) -> Option<WageLookup> {
        self.store
            .snapshot()
            .wage_table
            .lookup(classification, hours_worked, months_employed, effective_date)
    }

    /// Multi-angle retrieval (spec'd pipeline, stages guarded individually)
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrievalResponse> {
        let state = Arc::clone(&self.state.read().expect("engine lock poisoned"));
        let snapshot = Arc::clone(&state.snapshot);
        let config = &self.config;
        let k = options.top_k.unwrap_or(config.top_k);

        // 1. Classify intent (CPU-bound, regex)
        let intent = state
            .classifier
            .classify(query, options.classification.as_deref());
        let classification = intent.classification.clone();

        // 2. Interpret into search angles
        let interpretation = match &self.interpreter {
            Some(interpreter) if config.enable_interpreter => interpreter.interpret(query).await,
            _ => Interpretation::passthrough(query),
        };

        // 3. Hypothesize section titles once per request
        let hypothesis_result = match &self.hypothesis {
            Some(generator) if config.enable_hypothesis => Some(generator.generate(query).await),
            _ => None,
        };
        let hypothesis_titles: Vec<String> = hypothesis_result
            .as_ref()
            .filter(|outcome| outcome.success)
            .map(|outcome| outcome.titles.clone())
            .unwrap_or_default();

        // 4. Seed the merge with explicit-article fetches
        let mut merged: HashMap<String, ScoredChunk> = HashMap::new();
        let mut explicit_articles_fetched = Vec::new();
        for article in &interpretation.explicit_articles {
            let article_chunks = snapshot.article_chunks(*article);
            if article_chunks.is_empty() {
                continue;
            }
            explicit_articles_fetched.push(*article);
            for chunk in article_chunks {
                let mut scored =
                    ScoredChunk::new(chunk.as_ref().clone(), config.explicit_seed_similarity);
                scored.search_angle = Some(format!("explicit_article_{}", article));
                merge_max(&mut merged, scored);
            }
        }

        // 5. Fan angles out; wage lookup joins the same await point
        let angles = interpretation.all_search_queries(config.max_search_angles);
        let search_angles_used = angles.len();

        let boosts = VectorBoosts {
            articles: intent.relevant_articles.clone(),
            classification: classification.clone(),
            topic: intent.topic.clone(),
            high_stakes: intent.intent_type == IntentType::HighStakes,
        };

        let angle_futures = stream::iter(angles.iter().enumerate().map(|(index, angle)| {
            self.search_one_angle(
                &state,
                angle,
                index,
                k,
                &interpretation,
                &boosts,
                &hypothesis_titles,
            )
        }))
        .buffer_unordered(ANGLE_CONCURRENCY.min(search_angles_used.max(1)))
        .collect::<Vec<_>>();

        let wage_future = async {
            if intent.intent_type != IntentType::Wage {
                return None;
            }
            let classification = classification.as_deref()?;
            snapshot.wage_table.lookup(
                classification,
                options.hours_worked,
                options.months_employed,
                options.effective_date.as_deref(),
            )
        };

        let (angle_results, wage_info) = tokio::join!(angle_futures, wage_future);

        let mut search_failures = 0usize;
        for result in angle_results {
            match result {
                Ok(scored_chunks) => {
                    for scored in scored_chunks {
                        merge_max(&mut merged, scored);
                    }
                }
                Err(e) => {
                    tracing::warn!("Search angle failed: {}", e);
                    search_failures += 1;
                }
            }
        }

        // Request-level failure only when every leg failed and nothing at
        // all was retrieved.
        if search_failures == search_angles_used && merged.is_empty() && search_angles_used > 0 {
            return Err(crate::error::StewardError::Search(
                "all search angles failed".to_string(),
            ));
        }

        // 6. Merge is max-score, order-independent; sort and cap
        let mut chunks: Vec<ScoredChunk> = merged.into_values().collect();
        ScoredChunk::sort_descending(&mut chunks);
        chunks.truncate(config.max_total_chunks);

        // 7. Rerank
        let reranker_result = match &self.reranker {
            Some(reranker) if config.enable_reranker => Some(
                reranker
                    .rerank(query, &mut chunks, Some(&interpretation), config)
                    .await,
            ),
            _ => None,
        };

        // 8. Full-article expansion
        self.expand_dominant_article(&snapshot, &mut chunks, k);

        // 9. Sibling-section expansion
        self.expand_sibling_sections(&snapshot, &mut chunks);

        Ok(RetrievalResponse {
            chunks,
            wage_info,
            escalation_required: intent.requires_escalation,
            intent,
            interpretation,
            hypothesis_result,
            reranker_result,
            search_angles_used,
            explicit_articles_fetched,
            generation: snapshot.generation,
        })
    }

    /// One angle through its sub-pipeline: HyDE angles go straight to the
    /// vector index (BM25 over long synthesized prose distorts fusion);
    /// everything else runs the full hybrid pipeline with slang expansion,
    /// hypothesis title expansion, and title boosting.
    #[allow(clippy::too_many_arguments)]
    async fn search_one_angle(
        &self,
        state: &EngineState,
        angle: &str,
        index: usize,
        k: usize,
        interpretation: &Interpretation,
        boosts: &VectorBoosts,
        hypothesis_titles: &[String],
    ) -> Result<Vec<ScoredChunk>> {
        let config = &self.config;
        let angle_tag = if interpretation.is_hypothetical(angle) {
            format!("hyde_{}", index)
        } else if index == 0 {
            "original".to_string()
        } else {
            format!("alternate_{}", index)
        };

        if interpretation.is_hypothetical(angle) {
            let hits = state
                .vector
                .search(angle, k * 2, &VectorFilters::default(), boosts, config)
                .await?;
            let mut results = Vec::new();
            for hit in hits {
                if let Some(chunk) = state.snapshot.chunk(&hit.chunk_id) {
                    let mut scored = ScoredChunk::new(chunk.as_ref().clone(), hit.similarity);
                    scored.vector_score = hit.similarity;
                    scored.search_angle = Some(angle_tag.clone());
                    results.push(scored);
                }
            }
            return Ok(results);
        }

        let query = if config.enable_title_boosting && !hypothesis_titles.is_empty() {
            format!("{} ({})", angle, hypothesis_titles.join(" "))
        } else {
            angle.to_string()
        };

        let searcher = HybridSearcher {
            snapshot: &state.snapshot,
            bm25: &state.bm25,
            vector: &state.vector,
            slang: &state.slang,
            config,
        };
        let mut results = searcher
            .search(&HybridRequest {
                query,
                k,
                filters: VectorFilters::default(),
                boosts: boosts.clone(),
                concept_query: Some(interpretation.original_query.clone()),
            })
            .await?;

        if config.enable_title_boosting {
            apply_title_boosting(&mut results, hypothesis_titles, config.title_boost);
        }

        for scored in &mut results {
            scored.search_angle = Some(angle_tag.clone());
        }
        Ok(results)
    }

    /// When one article dominates the top results, pull in the rest of that
    /// article for synthesis context. Never removes existing chunks and
    /// respects the hard total cap.
    fn expand_dominant_article(
        &self,
        snapshot: &Snapshot,
        chunks: &mut Vec<ScoredChunk>,
        top_n: usize,
    ) {
        let config = &self.config;
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for scored in chunks.iter().take(top_n) {
            if let Some(article) = scored.chunk.article_num {
                *counts.entry(article).or_insert(0) += 1;
            }
        }

        let dominant = counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
        let (article, count) = match dominant {
            Some(pair) => pair,
            None => return,
        };
        if count < config.full_article_threshold {
            return;
        }

        let present: BTreeSet<&str> = chunks.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
        let mut additions = Vec::new();
        for chunk in snapshot.article_chunks(article) {
            if chunks.len() + additions.len() >= config.max_total_chunks {
                break;
            }
            if present.contains(chunk.chunk_id.as_str()) {
                continue;
            }
            let mut scored =
                ScoredChunk::new(chunk.as_ref().clone(), config.full_article_similarity);
            scored.is_full_article_context = true;
            additions.push(scored);
        }

        if !additions.is_empty() {
            tracing::debug!(
                "Full-article expansion: article {} ({} chunks appended)",
                article,
                additions.len()
            );
            chunks.extend(additions);
        }
    }

    /// Pull up to `sibling_limit` earlier sibling sections for each article
    /// represented; earlier sections often carry the definitions the cited
    /// provisions lean on.
    fn expand_sibling_sections(&self, snapshot: &Snapshot, chunks: &mut Vec<ScoredChunk>) {
        let config = &self.config;
        let present: BTreeSet<String> =
            chunks.iter().map(|c| c.chunk.chunk_id.clone()).collect();

        // Earliest section already present per article (expansion chunks
        // included; they are part of the represented set)
        let mut earliest: HashMap<u32, u32> = HashMap::new();
        for scored in chunks.iter() {
            if let (Some(article), Some(section)) =
                (scored.chunk.article_num, scored.chunk.section_num)
            {
                let entry = earliest.entry(article).or_insert(section);
                if section < *entry {
                    *entry = section;
                }
            }
        }

        let mut additions: Vec<ScoredChunk> = Vec::new();
        let mut articles: Vec<(u32, u32)> = earliest.into_iter().collect();
        articles.sort_unstable();
        'outer: for (article, first_section) in articles {
            let mut taken = 0usize;
            for chunk in snapshot.article_chunks(article) {
                if chunks.len() + additions.len() >= config.max_total_chunks {
                    break 'outer;
                }
                if taken >= config.sibling_limit {
                    break;
                }
                match chunk.section_num {
                    Some(section) if section < first_section => {}
                    _ => continue,
                }
                if present.contains(&chunk.chunk_id) {
                    continue;
                }
                let mut scored =
                    ScoredChunk::new(chunk.as_ref().clone(), config.sibling_similarity);
                scored.is_related = true;
                additions.push(scored);
                taken += 1;
            }
        }

        chunks.extend(additions);
    }
}

/// Keep the highest-scoring copy per chunk id. Max is commutative and
/// associative, so angle completion order cannot change the outcome.
fn merge_max(merged: &mut HashMap<String, ScoredChunk>, scored: ScoredChunk) {
    match merged.get_mut(&scored.chunk.chunk_id) {
        Some(existing) => {
            if scored.similarity > existing.similarity {
                *existing = scored;
            }
        }
        None => {
            merged.insert(scored.chunk.chunk_id.clone(), scored);
        }
    }
}
