//! End-to-end pipeline tests: ingest a synthetic contract, build the
//! indexes, and drive retrieval through the public API with a deterministic
//! embedder and scripted LLM clients.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use steward_core::{
    ingest_contract, Config, DataLayout, Embedder, EmbeddingStore, FallbackEmbedder,
    GenerationOptions, IntentType, LLMClient, Manifest, RetrievalConfig, RetrieveOptions,
    Retriever, RuleEnricher, StewardError,
};

const CONTRACT: &str = r#"AGREEMENT between Mountain Grocery Inc. and UFCW Local 7,
covering the Front Range bargaining unit.

## ARTICLE 2 RECOGNITION

Section **1**. Bargaining Unit. The Employer recognizes the Union as the sole
and exclusive bargaining representative for all employees in the unit. Work
customarily performed by bargaining unit employees shall not be assigned to
others except as provided herein.

Section **2**. Vendor Work. Vendors shall be permitted to stock and rotate
their own product only to the extent such work does not displace bargaining
unit employees from work customarily performed in the store.

## ARTICLE 9 WAGES

Section **1**. Rates of Pay. Employees shall be paid the rates set forth in
Appendix A according to their classification and accumulated hours worked.
Premiums and progression increases apply as scheduled therein.

## ARTICLE 12
## HOURS OF WORK

Section **28**. Overtime. All work performed in excess of eight (8) hours in
one day or forty (40) hours in one week shall be paid for at the rate of time
and one-half the straight-time hourly rate of pay.

Section **29**. Sunday Premium. Employees who work on Sunday shall receive a
premium of one dollar ($1.00) per hour in addition to the straight-time rate
for all hours worked on that day.

## ARTICLE 16 HOLIDAYS

Section **3**. Personal Holidays. Each employee who has completed one (1) year
of continuous service shall be entitled to two (2) personal holidays each
contract year, scheduled by mutual agreement between the employee and store
management at least one week in advance.

## ARTICLE 25 RELIEF PERIODS

Section **1**. Rest Periods. A relief period of fifteen (15) minutes shall be
provided for each four (4) hours worked, scheduled as near the middle of the
work period as practicable, without deduction from pay.

## ARTICLE 43 DISCHARGE

Section **1**. Just Cause. Discharge and suspension shall be for just cause
only. An employee who believes a discharge or termination was without just
cause may protest it through the grievance procedure within the time limits
stated in Article 44.

## ARTICLE 44 GRIEVANCE PROCEDURE

Section **1**. Filing. A grievance is any dispute concerning the
interpretation or application of this Agreement and must be filed in writing
within ten (10) days of the event giving rise to it.

<table>
<tr><td>CLASSIFICATION</td><td>Effective</td><td>Effective</td><td>Effective</td></tr>
<tr><td></td><td>1/23/2022</td><td>1/22/2023</td><td>1/21/2024</td></tr>
<tr><td>HEAD CLERK</td><td>$26.05</td><td>$27.30</td><td>$28.40</td></tr>
<tr><td colspan="4">ALL PURPOSE CLERK</td></tr>
<tr><td>Start</td><td>$16.00</td><td>$17.00</td><td>$17.75</td></tr>
<tr><td>After 2080 hours</td><td>$17.10</td><td>$18.10</td><td>$18.85</td></tr>
<tr><td>After 4160 hours</td><td>$18.45</td><td>$19.45</td><td>$20.20</td></tr>
<tr><td>After 6240 hours</td><td>$20.80</td><td>$21.80</td><td>$22.55</td></tr>
</table>
"#;

fn reference_manifest() -> Manifest {
    let mut manifest = Manifest {
        contract_id: "mountain_grocery_2022".into(),
        employer: "Mountain Grocery Inc.".into(),
        union_local: "UFCW Local 7".into(),
        ..Default::default()
    };
    let routing = &mut manifest.query_routing;
    routing.topic_to_articles.insert("personal_holiday".into(), vec![16]);
    routing.topic_to_articles.insert("vacation".into(), vec![16]);
    routing.topic_to_articles.insert("breaks".into(), vec![25]);
    routing.topic_to_articles.insert("overtime".into(), vec![12]);
    routing.topic_to_articles.insert("wages".into(), vec![9]);
    routing.topic_to_articles.insert("discipline".into(), vec![43]);
    routing.topic_to_articles.insert("grievance".into(), vec![44]);
    manifest
}

/// Scripted LLM client; pops queued responses in call order
struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    fn always_failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl LLMClient for ScriptedClient {
    async fn generate(
        &self,
        _system: &str,
        _user: &str,
        _options: &GenerationOptions,
    ) -> steward_core::Result<String> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(StewardError::ExternalError(message)),
            None => Err(StewardError::ExternalError("service unavailable".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

async fn build_retriever(
    llm: Option<Arc<dyn LLMClient>>,
    config: RetrievalConfig,
) -> Retriever {
    let temp = tempfile::TempDir::new().unwrap();
    let layout = DataLayout::new(temp.path());
    let store = EmbeddingStore::open_in_memory().unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(FallbackEmbedder::new(128));
    let enricher = RuleEnricher::new();

    let (snapshot, report) = ingest_contract(
        CONTRACT,
        "mountain_grocery_2022",
        &enricher,
        Arc::clone(&embedder),
        &store,
        &layout,
        Some(reference_manifest()),
    )
    .await
    .unwrap();

    assert!(report.total_chunks >= 8, "expected a chunk per section");

    let records = store.load_collection("mountain_grocery_2022").unwrap();
    Retriever::new(snapshot, records, embedder, llm, config)
}

#[tokio::test]
async fn scenario_slang_expansion_personal_holiday() {
    let retriever = build_retriever(None, RetrievalConfig::default()).await;
    let response = retriever
        .retrieve("do i get float days?", &RetrieveOptions::default())
        .await
        .unwrap();

    assert_eq!(response.intent.topic.as_deref(), Some("personal_holiday"));
    assert_eq!(response.intent.relevant_articles, vec![16]);

    let top5: Vec<Option<u32>> = response
        .chunks
        .iter()
        .take(5)
        .map(|c| c.chunk.article_num)
        .collect();
    assert!(
        top5.contains(&Some(16)),
        "expected Article 16 in top 5, got {:?}",
        top5
    );
}

#[tokio::test]
async fn scenario_high_stakes_active_situation() {
    let retriever = build_retriever(None, RetrievalConfig::default()).await;
    let response = retriever
        .retrieve("i was just fired, what do i do?", &RetrieveOptions::default())
        .await
        .unwrap();

    assert_eq!(response.intent.intent_type, IntentType::HighStakes);
    assert!(response.escalation_required);
    assert!(response.intent.relevant_articles.contains(&43));
    assert!(response.intent.relevant_articles.contains(&44));

    let top5: Vec<Option<u32>> = response
        .chunks
        .iter()
        .take(5)
        .map(|c| c.chunk.article_num)
        .collect();
    assert!(
        top5.contains(&Some(43)),
        "expected the discharge article in top 5, got {:?}",
        top5
    );
}

#[tokio::test]
async fn scenario_explicit_article_reference() {
    let retriever = build_retriever(None, RetrievalConfig::default()).await;
    let response = retriever
        .retrieve(
            "check Article 2 - it talks about vendors",
            &RetrieveOptions::default(),
        )
        .await
        .unwrap();

    assert!(response.interpretation.explicit_articles.contains(&2));
    assert_eq!(response.explicit_articles_fetched, vec![2]);

    let seeded: Vec<_> = response
        .chunks
        .iter()
        .filter(|c| c.chunk.article_num == Some(2))
        .collect();
    assert!(seeded.len() >= 2, "both Article 2 sections fetched");
    for scored in &seeded {
        assert!(scored.similarity >= 0.9);
        assert!(scored
            .search_angle
            .as_deref()
            .unwrap()
            .starts_with("explicit_article_"));
    }
    assert_eq!(response.chunks[0].chunk.article_num, Some(2));
}

#[tokio::test]
async fn scenario_wage_lookup_by_classification_and_hours() {
    let retriever = build_retriever(None, RetrievalConfig::default()).await;
    let options = RetrieveOptions {
        classification: Some("all_purpose_clerk".into()),
        hours_worked: 5000,
        ..Default::default()
    };
    let response = retriever
        .retrieve("what is my hourly rate right now?", &options)
        .await
        .unwrap();

    assert_eq!(response.intent.intent_type, IntentType::Wage);
    let wage = response.wage_info.expect("wage info for wage intent");
    // Highest step with hours_required <= 5000
    assert_eq!(wage.step, "After 4160 hours");
    assert_eq!(wage.rate, 20.20);
    assert_eq!(wage.effective_date, "2024-01-21");
    assert_eq!(wage.citation, "Appendix A");
}

#[tokio::test]
async fn scenario_concept_index_bridges_break_vocabulary() {
    let retriever = build_retriever(None, RetrievalConfig::default()).await;

    // "break" appears nowhere in the contract text; the rule enricher seeds
    // it as an alternative name on the relief-period article.
    let snapshot = retriever.snapshot();
    let bridged = snapshot.concept_index.find_articles_by_concept("when do I get a break?");
    assert!(bridged.contains(&25));

    let response = retriever
        .retrieve("when do I get a break?", &RetrieveOptions::default())
        .await
        .unwrap();

    let top3: Vec<Option<u32>> = response
        .chunks
        .iter()
        .take(3)
        .map(|c| c.chunk.article_num)
        .collect();
    assert!(
        top3.contains(&Some(25)),
        "expected Article 25 in top 3, got {:?}",
        top3
    );
}

#[tokio::test]
async fn scenario_reranker_failure_degrades_to_pre_rerank_order() {
    // Run A: every LLM call fails (interpreter, hypothesis, reranker)
    let failing: Arc<dyn LLMClient> = Arc::new(ScriptedClient::always_failing());
    let retriever_a = build_retriever(Some(failing), RetrievalConfig::default()).await;
    let response_a = retriever_a
        .retrieve("sunday premium pay", &RetrieveOptions::default())
        .await
        .unwrap();

    let rerank = response_a.reranker_result.expect("reranker ran");
    assert!(!rerank.success);
    assert!(rerank.error.is_some());
    assert!(!response_a.interpretation.success);

    // Run B: LLM stages disabled outright
    let config_b = RetrievalConfig {
        enable_interpreter: false,
        enable_hypothesis: false,
        enable_reranker: false,
        ..Default::default()
    };
    let retriever_b = build_retriever(None, config_b).await;
    let response_b = retriever_b
        .retrieve("sunday premium pay", &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(response_b.reranker_result.is_none());

    // The chunk lists are bit-identical: failed stages contribute nothing
    let chunks_a = serde_json::to_string(&response_a.chunks).unwrap();
    let chunks_b = serde_json::to_string(&response_b.chunks).unwrap();
    assert_eq!(chunks_a, chunks_b);
}

#[tokio::test]
async fn llm_stages_drive_multi_angle_retrieval() {
    let interpreter_json = r#"{
        "intent": "find overtime threshold",
        "key_concepts": ["overtime", "eight hours"],
        "entities": {"benefit": "overtime"},
        "hypothetical_answers": [
            "All work performed in excess of eight hours in one day shall be paid at time and one-half the straight-time rate."
        ],
        "search_queries": ["overtime premium after eight hours"],
        "likely_sections": ["Hours of Work"],
        "explicit_articles": []
    }"#;
    let scripted: Arc<dyn LLMClient> = Arc::new(ScriptedClient::new(vec![
        Ok(interpreter_json.to_string()),        // interpreter
        Ok("Hours of Work\nOvertime".to_string()), // hypothesis titles
        Ok("{\"0\": 9, \"1\": 7}".to_string()),  // reranker scores
    ]));

    let retriever = build_retriever(Some(scripted), RetrievalConfig::default()).await;
    let response = retriever
        .retrieve("when does ot kick in?", &RetrieveOptions::default())
        .await
        .unwrap();

    assert!(response.interpretation.success);
    assert!(response.search_angles_used >= 2);

    let hypothesis = response.hypothesis_result.expect("hypothesis ran");
    assert!(hypothesis.success);
    assert_eq!(hypothesis.titles, vec!["Hours of Work", "Overtime"]);

    let rerank = response.reranker_result.expect("reranker ran");
    assert!(rerank.success);

    // Title boosting plus the HyDE angle should put Article 12 on top
    assert_eq!(response.chunks[0].chunk.article_num, Some(12));

    // At least one chunk arrived via the HyDE vector-only angle or carries a
    // hypothesis match
    assert!(response
        .chunks
        .iter()
        .any(|c| c.hypothesis_matched
            || c.search_angle.as_deref().map(|a| a.starts_with("hyde")).unwrap_or(false)));
}

#[tokio::test]
async fn response_is_config_driven_and_capped() {
    let config = RetrievalConfig {
        max_total_chunks: 4,
        ..Default::default()
    };
    let retriever = build_retriever(None, config).await;
    let response = retriever
        .retrieve("overtime sunday premium grievance discharge", &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(response.chunks.len() <= 4);
}

#[tokio::test]
async fn config_loads_defaults_without_file() {
    // Sanity: library consumers can always construct a config
    let config = Config::default();
    assert_eq!(config.retrieval.top_k, 5);
}
