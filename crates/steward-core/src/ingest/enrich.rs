//! Rule-based chunk enrichment
//!
//! Attaches semantic metadata (topics, classifications, cross-references,
//! flags, summary, vocabulary bridges) using fixed keyword tables. This is
//! both the baseline enricher and the fallback when LLM enrichment fails;
//! the two must agree on the vocabularies so enrichment is idempotent.

use crate::chunk::Chunk;
use crate::error::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Fixed topic vocabulary. Enrichment output is filtered against this list.
pub const TOPICS: &[&str] = &[
    "wages",
    "overtime",
    "scheduling",
    "seniority",
    "layoff",
    "vacation",
    "personal_holiday",
    "sick_leave",
    "discipline",
    "grievance",
    "union_security",
    "union_rights",
    "safety",
    "benefits",
    "breaks",
    "premiums",
    "probation",
    "store_closing",
];

/// Fixed classification vocabulary ("all" plus detected job titles)
pub const CLASSIFICATIONS: &[&str] = &[
    "all",
    "all_purpose_clerk",
    "courtesy_clerk",
    "head_clerk",
    "produce_manager",
    "bakery_manager",
    "pharmacy_tech",
    "cake_decorator",
    "non_foods_clerk",
    "sanitation_clerk",
    "dug_shopper",
];

/// Keyword table: topic -> content keywords that signal it
const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "wages",
        &[
            "wage", "pay rate", "rates of pay", "salary", "compensation", "appendix a",
            "hourly rate", "step", "progression", "starting pay", "top rate",
        ],
    ),
    (
        "overtime",
        &[
            "overtime", "time and one-half", "time and a half", "double time",
            "excess of eight", "excess of forty", "over 8 hours", "over 40 hours",
        ],
    ),
    (
        "scheduling",
        &[
            "schedule", "scheduling", "shift", "workweek", "work week", "posted",
            "posting", "start time", "minimum hours", "maximum hours",
        ],
    ),
    (
        "seniority",
        &[
            "seniority", "length of service", "years of service", "hire date",
            "continuous service", "most senior", "least senior",
        ],
    ),
    (
        "layoff",
        &[
            "layoff", "lay off", "laid off", "bumping", "displacement", "recall",
            "workforce reduction", "furlough",
        ],
    ),
    (
        "personal_holiday",
        &["personal holiday", "personal holidays", "personal day", "floating holiday"],
    ),
    (
        "vacation",
        &["vacation", "holiday", "time off", "paid time off", "anniversary"],
    ),
    (
        "sick_leave",
        &["sick leave", "sick day", "sick pay", "illness", "medical leave", "call in sick"],
    ),
    (
        "discipline",
        &[
            "discipline", "disciplinary", "discharge", "termination", "warning",
            "suspension", "corrective action", "just cause", "dismissal",
        ],
    ),
    (
        "grievance",
        &[
            "grievance", "arbitration", "dispute", "step 1", "step 2", "step 3",
            "back pay", "time limit",
        ],
    ),
    (
        "union_security",
        &["union membership", "union dues", "check-off", "initiation fee", "union shop"],
    ),
    (
        "union_rights",
        &[
            "steward", "union steward", "representation", "weingarten", "union rep",
            "business representative", "visitation",
        ],
    ),
    (
        "safety",
        &[
            "safety", "injury", "injured", "workers comp", "hazard", "unsafe",
            "accident", "protective equipment",
        ],
    ),
    (
        "benefits",
        &[
            "health", "welfare", "pension", "insurance", "medical", "dental",
            "vision", "trust fund", "eligibility",
        ],
    ),
    (
        "breaks",
        &[
            "lunch", "lunch period", "relief period", "relief", "meal period",
            "rest period", "rest break", "15 minute",
        ],
    ),
    (
        "premiums",
        &["premium", "sunday premium", "night premium", "shift differential"],
    ),
    (
        "probation",
        &["probation", "probationary", "trial period", "first sixty days", "new employee"],
    ),
    (
        "store_closing",
        &["store closing", "severance", "dislocation", "relocation", "new store"],
    ),
];

/// Keyword table: classification -> content phrases that name it
const CLASSIFICATION_KEYWORDS: &[(&str, &[&str])] = &[
    ("courtesy_clerk", &["courtesy clerk"]),
    ("head_clerk", &["head clerk"]),
    ("produce_manager", &["produce department manager", "produce manager"]),
    ("bakery_manager", &["bakery department manager", "bakery manager"]),
    ("pharmacy_tech", &["pharmacy technician"]),
    ("cake_decorator", &["cake decorator"]),
    ("all_purpose_clerk", &["all purpose clerk", "all-purpose clerk"]),
    ("non_foods_clerk", &["non-foods clerk", "general merchandise clerk", "gm clerk"]),
    ("sanitation_clerk", &["sanitation clerk"]),
    ("dug_shopper", &["dug shopper", "drive up and go"]),
];

/// Worker vocabulary per topic, used to seed alternative_names so the
/// concept index can bridge slang even without LLM enrichment
const TOPIC_SYNONYMS: &[(&str, &[&str])] = &[
    ("breaks", &["break", "lunch break", "rest break"]),
    ("personal_holiday", &["floater", "float day", "float days", "personal day"]),
    ("overtime", &["ot", "extra hours", "time and a half"]),
    ("wages", &["pay", "paycheck", "raise"]),
    ("discipline", &["fired", "write up", "written up", "canned"]),
    ("union_rights", &["steward", "union rep", "rep"]),
    ("vacation", &["pto", "days off"]),
    ("sick_leave", &["sick time", "call in sick", "call out"]),
    ("seniority", &["bumping rights", "years in"]),
    ("grievance", &["file a grievance", "complaint"]),
];

const HIGH_STAKES_KEYWORDS: &[&str] = &[
    "discharge",
    "discharged",
    "termination",
    "terminated",
    "fired",
    "dismissal",
    "discipline",
    "disciplinary",
    "suspension",
    "suspended",
    "harassment",
    "harassed",
    "discrimination",
    "retaliation",
    "weingarten",
    "just cause",
    "investigation",
    "no strike",
    "lockout",
];

lazy_static! {
    static ref ARTICLE_REFERENCE: Regex = Regex::new(r"(?i)Article\s+(\d+)").unwrap();
    static ref DEFINITION_PATTERN: Regex =
        Regex::new(r"(?i)shall mean|is defined as|definitions?\b|for the purposes? of this")
            .unwrap();
    static ref EXCEPTION_PATTERN: Regex =
        Regex::new(r"(?i)except\b|provided,? however|shall not apply|notwithstanding").unwrap();
    static ref HIRE_DATE_PATTERN: Regex =
        Regex::new(r"(?i)hired (?:on or )?(?:before|after)|prior to (?:\w+ \d{1,2}, \d{4}|\d{1,2}/\d{1,2}/\d{2,4})")
            .unwrap();
}

/// Metadata produced by an enricher, applied to a chunk copy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub applies_to: Vec<String>,
    pub topics: Vec<String>,
    pub cross_references: Vec<String>,
    pub summary: Option<String>,
    pub worker_questions: Vec<String>,
    pub alternative_names: Vec<String>,
    pub is_definition: bool,
    pub is_exception: bool,
    pub hire_date_sensitive: bool,
    pub is_high_stakes: bool,
}

impl Enrichment {
    /// Apply this enrichment to a chunk, returning the enriched copy
    pub fn apply(self, chunk: &Chunk) -> Chunk {
        let mut enriched = chunk.clone();
        enriched.applies_to = if self.applies_to.is_empty() {
            vec!["all".to_string()]
        } else {
            self.applies_to
        };
        enriched.topics = self.topics;
        enriched.cross_references = self.cross_references;
        enriched.summary = self.summary;
        enriched.worker_questions = self.worker_questions;
        enriched.alternative_names = self.alternative_names;
        enriched.is_definition = self.is_definition;
        enriched.is_exception = self.is_exception;
        enriched.hire_date_sensitive = self.hire_date_sensitive;
        enriched.is_high_stakes = self.is_high_stakes;
        enriched
    }
}

/// Keep only values present in the fixed topic vocabulary
pub fn filter_topics(topics: Vec<String>) -> Vec<String> {
    topics
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| TOPICS.contains(&t.as_str()))
        .collect()
}

/// Keep only values present in the fixed classification vocabulary
pub fn filter_classifications(classifications: Vec<String>) -> Vec<String> {
    classifications
        .into_iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| CLASSIFICATIONS.contains(&c.as_str()))
        .collect()
}

/// Enricher contract: attach semantic metadata to one chunk.
///
/// Implementations must never abandon a chunk; on terminal upstream failure
/// they fall back to defaults and complete.
#[async_trait]
pub trait ChunkEnricher: Send + Sync {
    async fn enrich(&self, chunk: &Chunk) -> Result<Enrichment>;

    /// Implementation name for logs
    fn name(&self) -> &str;
}

/// Deterministic keyword/regex enricher. Instant, no network.
#[derive(Debug, Default, Clone)]
pub struct RuleEnricher;

impl RuleEnricher {
    pub fn new() -> Self {
        Self
    }

    /// Enrich synchronously; also used directly as the LLM fallback path
    pub fn enrich_sync(&self, chunk: &Chunk) -> Enrichment {
        let text = chunk.content.to_lowercase();

        let mut topics = Vec::new();
        for (topic, keywords) in TOPIC_KEYWORDS {
            if keywords.iter().any(|kw| text.contains(kw)) {
                topics.push(topic.to_string());
            }
        }

        let mut applies_to = Vec::new();
        for (class, keywords) in CLASSIFICATION_KEYWORDS {
            if keywords.iter().any(|kw| text.contains(kw)) {
                applies_to.push(class.to_string());
            }
        }
        if applies_to.is_empty() {
            applies_to.push("all".to_string());
        }

        let mut cross_references = Vec::new();
        for caps in ARTICLE_REFERENCE.captures_iter(&chunk.content) {
            let reference = format!("art{}", &caps[1]);
            // Self-references are not cross-references
            if chunk
                .article_num
                .map(|n| format!("art{}", n) == reference)
                .unwrap_or(false)
            {
                continue;
            }
            if !cross_references.contains(&reference) {
                cross_references.push(reference);
            }
        }

        let mut alternative_names = Vec::new();
        for (topic, synonyms) in TOPIC_SYNONYMS {
            if topics.iter().any(|t| t == topic) {
                for syn in *synonyms {
                    let syn = syn.to_string();
                    if !alternative_names.contains(&syn) {
                        alternative_names.push(syn);
                    }
                }
            }
        }

        Enrichment {
            applies_to,
            topics,
            cross_references,
            summary: Some(summarize(&chunk.content)),
            worker_questions: Vec::new(),
            alternative_names,
            is_definition: DEFINITION_PATTERN.is_match(&chunk.content),
            is_exception: EXCEPTION_PATTERN.is_match(&chunk.content),
            hire_date_sensitive: HIRE_DATE_PATTERN.is_match(&chunk.content),
            is_high_stakes: HIGH_STAKES_KEYWORDS.iter().any(|kw| text.contains(kw)),
        }
    }
}

#[async_trait]
impl ChunkEnricher for RuleEnricher {
    async fn enrich(&self, chunk: &Chunk) -> Result<Enrichment> {
        Ok(self.enrich_sync(chunk))
    }

    fn name(&self) -> &str {
        "rule"
    }
}

/// One-sentence summary capped at 150 chars
fn summarize(content: &str) -> String {
    let first_sentence = content
        .split_terminator(['.', '\n'])
        .map(str::trim)
        .find(|s| s.len() > 20)
        .unwrap_or_else(|| content.trim());

    if first_sentence.len() <= 150 {
        first_sentence.to_string()
    } else {
        let mut cut = 147;
        while !first_sentence.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &first_sentence[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::DocType;

    fn chunk_with_content(content: &str) -> Chunk {
        Chunk {
            chunk_id: "art12_sec28".into(),
            contract_id: "test".into(),
            article_num: Some(12),
            article_title: Some("HOURS OF WORK".into()),
            section_num: Some(28),
            subsection: None,
            subsection_title: None,
            citation: "Article 12, Section 28".into(),
            parent_context: String::new(),
            content: content.to_string(),
            char_count: content.len(),
            doc_type: DocType::Cba,
            applies_to: vec!["all".into()],
            topics: vec![],
            cross_references: vec![],
            summary: None,
            worker_questions: vec![],
            alternative_names: vec![],
            is_definition: false,
            is_exception: false,
            hire_date_sensitive: false,
            is_high_stakes: false,
        }
    }

    #[test]
    fn test_topics_detected_from_keywords() {
        let chunk = chunk_with_content(
            "All work performed in excess of eight hours shall be paid at the \
             overtime rate of time and one-half.",
        );
        let enrichment = RuleEnricher::new().enrich_sync(&chunk);
        assert!(enrichment.topics.contains(&"overtime".to_string()));
    }

    #[test]
    fn test_personal_holiday_beats_generic_vacation_in_vocab() {
        let chunk = chunk_with_content(
            "Each employee shall be entitled to two personal holidays each contract year.",
        );
        let enrichment = RuleEnricher::new().enrich_sync(&chunk);
        assert!(enrichment.topics.contains(&"personal_holiday".to_string()));
    }

    #[test]
    fn test_classification_detection() {
        let chunk = chunk_with_content(
            "Courtesy clerks shall not be assigned checkstand duties except as relief.",
        );
        let enrichment = RuleEnricher::new().enrich_sync(&chunk);
        assert_eq!(enrichment.applies_to, vec!["courtesy_clerk".to_string()]);
        assert!(enrichment.is_exception);
    }

    #[test]
    fn test_cross_references_exclude_self() {
        let chunk = chunk_with_content(
            "As provided in Article 12 and Article 43, grievances must be filed \
             within the time limit.",
        );
        let enrichment = RuleEnricher::new().enrich_sync(&chunk);
        assert_eq!(enrichment.cross_references, vec!["art43".to_string()]);
    }

    #[test]
    fn test_high_stakes_flag() {
        let chunk = chunk_with_content(
            "No employee shall be discharged or suspended except for just cause.",
        );
        let enrichment = RuleEnricher::new().enrich_sync(&chunk);
        assert!(enrichment.is_high_stakes);
        assert!(enrichment.topics.contains(&"discipline".to_string()));
    }

    #[test]
    fn test_breaks_topic_seeds_break_synonym() {
        let chunk = chunk_with_content(
            "Employees shall receive a relief period of fifteen minutes for each \
             four hours worked.",
        );
        let enrichment = RuleEnricher::new().enrich_sync(&chunk);
        assert!(enrichment.topics.contains(&"breaks".to_string()));
        assert!(enrichment.alternative_names.contains(&"break".to_string()));
    }

    #[test]
    fn test_enrichment_is_idempotent() {
        let chunk = chunk_with_content(
            "Overtime shall be paid at time and one-half for work in excess of \
             forty hours per week as described in Article 9.",
        );
        let enricher = RuleEnricher::new();
        let first = enricher.enrich_sync(&chunk);
        let enriched = first.clone().apply(&chunk);
        let second = enricher.enrich_sync(&enriched);
        assert_eq!(first, second);
    }

    #[test]
    fn test_summary_capped_at_150_chars() {
        let long = "This sentence is deliberately made very long so that it will exceed the \
                    one hundred and fifty character limit that summaries must respect when \
                    the rule-based enricher produces them from raw content";
        let chunk = chunk_with_content(long);
        let enrichment = RuleEnricher::new().enrich_sync(&chunk);
        let summary = enrichment.summary.unwrap();
        assert!(summary.len() <= 150);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_vocabulary_filters() {
        let topics = filter_topics(vec![
            "Overtime".into(),
            "made_up_topic".into(),
            "breaks".into(),
        ]);
        assert_eq!(topics, vec!["overtime".to_string(), "breaks".to_string()]);

        let classes = filter_classifications(vec!["courtesy_clerk".into(), "astronaut".into()]);
        assert_eq!(classes, vec!["courtesy_clerk".to_string()]);
    }
}
