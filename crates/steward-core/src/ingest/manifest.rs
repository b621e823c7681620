//! Contract manifest
//!
//! Per-contract configuration: identity, term, structure, detected
//! classifications, and the query-routing maps (slang overlay, topic and
//! classification article routing, topic patterns). A manifest can be
//! supplied as JSON or auto-extracted from the contract once at ingestion;
//! a provided manifest always wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Routing maps carried in the manifest.
///
/// Article numbers are contract-specific and belong here, not in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRouting {
    /// Contract-specific slang overlay: worker term -> contract phrase
    #[serde(default)]
    pub slang_to_contract: BTreeMap<String, String>,

    /// topic -> article numbers that govern it
    #[serde(default)]
    pub topic_to_articles: BTreeMap<String, Vec<u32>>,

    /// classification -> article numbers that concern it
    #[serde(default)]
    pub classification_to_articles: BTreeMap<String, Vec<u32>>,

    /// Priority-ordered topic detection patterns (first match wins)
    #[serde(default)]
    pub topic_patterns: Vec<TopicPattern>,
}

/// One topic-detection pattern; list order is priority order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicPattern {
    pub topic: String,
    pub pattern: String,
}

/// Metadata about a contract for multi-tenant configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    // Identity
    pub contract_id: String,
    #[serde(default)]
    pub employer: String,
    #[serde(default)]
    pub union_local: String,
    #[serde(default)]
    pub bargaining_unit: String,

    // Term
    #[serde(default)]
    pub term_start: Option<String>,
    #[serde(default)]
    pub term_end: Option<String>,

    // Structure
    #[serde(default)]
    pub article_titles: BTreeMap<u32, String>,
    #[serde(default)]
    pub total_articles: usize,
    #[serde(default)]
    pub total_sections: usize,
    #[serde(default)]
    pub has_appendix_a: bool,
    #[serde(default)]
    pub has_lous: bool,

    // Classifications (auto-detected)
    #[serde(default)]
    pub classifications: Vec<String>,

    // Key dates (hire date cutoffs, grandfathering)
    #[serde(default)]
    pub key_dates: Vec<String>,

    // Topics covered (for display)
    #[serde(default)]
    pub topics_covered: Vec<String>,

    /// Routing maps (optional; empty routing disables manifest-driven boosts)
    #[serde(default)]
    pub query_routing: QueryRouting,
}

impl Manifest {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Articles routed for a topic, empty when unmapped
    pub fn articles_for_topic(&self, topic: &str) -> Vec<u32> {
        self.query_routing
            .topic_to_articles
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Articles routed for a classification, empty when unmapped
    pub fn articles_for_classification(&self, classification: &str) -> Vec<u32> {
        self.query_routing
            .classification_to_articles
            .get(classification)
            .cloned()
            .unwrap_or_default()
    }
}

lazy_static! {
    static ref EMPLOYER_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)between\s+([A-Z][A-Za-z\s,.]+(?:Inc\.|LLC|Corporation|Company))").unwrap(),
        Regex::new(r"(?i)employer[:\s]+([A-Z][A-Za-z\s,.]+(?:Inc\.|LLC))").unwrap(),
    ];
    static ref UNION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)(UFCW\s*Local\s*\d+)").unwrap(),
        Regex::new(r"(?i)(United\s+Food\s+(?:and|&)\s+Commercial\s+Workers\s+Local\s*\d+)")
            .unwrap(),
        Regex::new(r"(?i)(Local\s+\d+\s+of\s+the\s+[A-Z][A-Za-z\s]+)").unwrap(),
    ];
    static ref BARGAINING_UNIT_PATTERN: Regex =
        Regex::new(r"(?i)bargaining\s+unit[:\s]+([A-Za-z\s]+clerks?)").unwrap();
    static ref ARTICLE_TITLE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?m)^#{1,2}[ \t]*ARTICLE\s+(\d+)[ \t]*\n#{1,2}[ \t]*([A-Z][A-Z \t&,\-/]+)")
            .unwrap(),
        Regex::new(r"(?m)^#{1,2}[ \t]*ARTICLE\s+(\d+)[ \t]+([A-Z][A-Z \t&,\-/]+)").unwrap(),
        Regex::new(r"ARTICLE\s+(\d+)[:\s]+([A-Z][A-Z \t&,\-/]+)").unwrap(),
    ];
    static ref SECTION_NUMBER: Regex =
        Regex::new(r"(?i)Section\s+\*{0,2}(\d+)\*{0,2}").unwrap();
    static ref CLASSIFICATION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)all[\s-]*purpose\s*clerk").unwrap(),
        Regex::new(r"(?i)courtesy\s*clerk").unwrap(),
        Regex::new(r"(?i)head\s*clerk").unwrap(),
        Regex::new(r"(?i)produce\s*(?:department\s*)?manager").unwrap(),
        Regex::new(r"(?i)bakery\s*(?:department\s*)?manager").unwrap(),
        Regex::new(r"(?i)cake\s*decorator").unwrap(),
        Regex::new(r"(?i)pharmacy\s*tech(?:nician)?").unwrap(),
        Regex::new(r"(?i)non[\s-]*foods?\s*clerk").unwrap(),
        Regex::new(r"(?i)sanitation\s*clerk").unwrap(),
        Regex::new(r"(?i)dug\s*shopper").unwrap(),
        Regex::new(r"(?i)drive\s*up\s*(?:and\s*)?go").unwrap(),
    ];
    static ref KEY_DATE_PATTERN: Regex = Regex::new(
        r"(?i)(?:hired|employed)\s+(?:on\s+or\s+)?(?:before|after|prior\s+to)\s+((?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2},?\s*\d{4}|\d{1,2}/\d{1,2}/\d{4})"
    )
    .unwrap();
    static ref TERM_DATE_PATTERN: Regex = Regex::new(
        r"(?i)((?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2},?\s*\d{4})"
    )
    .unwrap();
}

/// Topics inferred from article titles: topic -> title keywords
const TITLE_TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("wages", &["wage", "pay", "compensation"]),
    ("scheduling", &["schedule", "hours", "assignment"]),
    ("vacation", &["vacation", "holiday", "time off"]),
    ("benefits", &["health", "benefit", "trust", "insurance", "pension"]),
    ("seniority", &["seniority", "layoff"]),
    ("grievance", &["grievance", "arbitration", "dispute"]),
    ("discipline", &["discharge", "discipline", "discrimination"]),
    ("safety", &["safety", "protective"]),
    ("breaks", &["relief", "rest", "meal"]),
];

/// Extract a manifest from contract markdown. Regex-driven, no LLM.
pub fn extract_manifest(content: &str, contract_id: &str) -> Manifest {
    let content_lower = content.to_lowercase();

    let mut manifest = Manifest {
        contract_id: contract_id.to_string(),
        ..Default::default()
    };

    manifest.employer = EMPLOYER_PATTERNS
        .iter()
        .find_map(|p| p.captures(content))
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    manifest.union_local = UNION_PATTERNS
        .iter()
        .find_map(|p| p.captures(content))
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    manifest.bargaining_unit = BARGAINING_UNIT_PATTERN
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    let term_dates: Vec<String> = TERM_DATE_PATTERN
        .captures_iter(content)
        .take(2)
        .map(|c| c[1].to_string())
        .collect();
    manifest.term_start = term_dates.first().cloned();
    manifest.term_end = term_dates.get(1).cloned();

    for pattern in ARTICLE_TITLE_PATTERNS.iter() {
        for caps in pattern.captures_iter(content) {
            if let Ok(num) = caps[1].parse::<u32>() {
                manifest
                    .article_titles
                    .entry(num)
                    .or_insert_with(|| title_case(caps[2].trim()));
            }
        }
    }
    manifest.total_articles = manifest.article_titles.len();

    let sections: std::collections::BTreeSet<String> = SECTION_NUMBER
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect();
    manifest.total_sections = sections.len();

    manifest.has_appendix_a = content_lower.contains("appendix a") || content_lower.contains("appendix");
    manifest.has_lous = content_lower.contains("letter of understanding");

    let mut classifications: Vec<String> = CLASSIFICATION_PATTERNS
        .iter()
        .filter_map(|p| p.find(&content_lower))
        .map(|m| title_case(m.as_str()))
        .collect();
    classifications.sort();
    classifications.dedup();
    manifest.classifications = classifications;

    let mut key_dates: Vec<String> = KEY_DATE_PATTERN
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect();
    key_dates.sort();
    key_dates.dedup();
    manifest.key_dates = key_dates;

    let titles_lower: String = manifest
        .article_titles
        .values()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    manifest.topics_covered = TITLE_TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| titles_lower.contains(kw)))
        .map(|(topic, _)| topic.to_string())
        .collect();

    manifest
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
