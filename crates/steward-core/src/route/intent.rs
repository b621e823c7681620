//! Intent classification
//!
//! Regex cascades label a query {wage, high_stakes, contract}, identify the
//! job classification and topic it concerns, and flag active situations that
//! warrant escalation. Article routing comes from the manifest's maps, never
//! from code: article numbers are contract-specific.

use crate::ingest::manifest::Manifest;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Query category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Wage,
    HighStakes,
    Contract,
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentType::Wage => write!(f, "wage"),
            IntentType::HighStakes => write!(f, "high_stakes"),
            IntentType::Contract => write!(f, "contract"),
        }
    }
}

/// Classified intent for one query
#[derive(Debug, Clone, Serialize)]
pub struct Intent {
    pub intent_type: IntentType,
    pub confidence: f64,
    pub classification: Option<String>,
    pub topic: Option<String>,
    pub requires_escalation: bool,
    pub matched_keywords: Vec<String>,
    pub relevant_articles: Vec<u32>,
}

/// Canonical wage-intent phrase list. "starting pay" is included: a wage
/// table answer exists for it.
const WAGE_PHRASES: &[&str] = &[
    "how much do i make",
    "how much will i make",
    "how much do i get paid",
    "what do i make",
    "what is my pay",
    "my pay rate",
    "pay rate",
    "rate of pay",
    "hourly rate",
    "wage",
    "wages",
    "starting pay",
    "top pay",
    "top rate",
    "salary",
    "get paid",
    "next raise",
];

/// Phrases that contain wage words but are not wage-table questions
const WAGE_EXCLUSIONS: &[&str] = &["vacation pay", "holiday pay", "pay stub", "pay period"];

lazy_static! {
    /// Active situations: present tense, happening to the asker now.
    /// Only these set requires_escalation.
    static ref HIGH_STAKES_ACTIVE: Vec<Regex> = vec![
        Regex::new(r"(?i)\bi\s+(?:was|am|got)\s+(?:just\s+)?(?:being\s+)?(?:fired|terminated|discharged|suspended|written\s+up)").unwrap(),
        Regex::new(r"(?i)\bjust\s+(?:got|been)\s+(?:fired|terminated|discharged|suspended|written\s+up)").unwrap(),
        Regex::new(r"(?i)\b(?:am|is|are)\s+being\s+(?:fired|terminated|harassed|discriminated|investigated|disciplined|retaliated)").unwrap(),
        Regex::new(r"(?i)\bmy\s+\w+\s+is\s+(?:harassing|threatening|retaliating)").unwrap(),
        Regex::new(r"(?i)\bthey\s+(?:are\s+)?(?:firing|suspending|investigating)\s+me\b").unwrap(),
    ];

    /// General high-stakes subject matter: informational, no escalation.
    static ref HIGH_STAKES_GENERAL: Vec<Regex> = vec![
        Regex::new(r"(?i)discriminat|harass|retaliat").unwrap(),
        Regex::new(r"(?i)weingarten").unwrap(),
        Regex::new(r"(?i)investigat").unwrap(),
        Regex::new(r"(?i)rights?\s+(?:during|in)\s+(?:a\s+)?(?:disciplinary|discipline|investigation|meeting)").unwrap(),
        Regex::new(r"(?i)\b(?:fired|terminated|discharged|termination|discharge)\b").unwrap(),
        Regex::new(r"(?i)\bjust\s+cause\b").unwrap(),
        Regex::new(r"(?i)\bsuspend").unwrap(),
    ];

    /// Classification phrases detectable in query text
    static ref QUERY_CLASSIFICATIONS: Vec<(&'static str, Regex)> = vec![
        ("courtesy_clerk", Regex::new(r"(?i)courtesy\s+clerk").unwrap()),
        ("all_purpose_clerk", Regex::new(r"(?i)all[\s-]*purpose\s+clerk").unwrap()),
        ("head_clerk", Regex::new(r"(?i)head\s+clerk").unwrap()),
        ("produce_manager", Regex::new(r"(?i)produce\s+(?:department\s+)?manager").unwrap()),
        ("bakery_manager", Regex::new(r"(?i)bakery\s+(?:department\s+)?manager").unwrap()),
        ("pharmacy_tech", Regex::new(r"(?i)pharmacy\s+tech").unwrap()),
        ("cake_decorator", Regex::new(r"(?i)cake\s+decorator").unwrap()),
        ("non_foods_clerk", Regex::new(r"(?i)(?:non[\s-]*foods?|gm)\s+clerk").unwrap()),
        ("sanitation_clerk", Regex::new(r"(?i)sanitation\s+clerk").unwrap()),
        ("dug_shopper", Regex::new(r"(?i)dug\s+shopper|drive\s+up\s+(?:and\s+)?go").unwrap()),
    ];
}

/// Built-in topic patterns in priority order: specific topics before generic
/// ones ("personal_holiday" before "vacation"), "scheduling" last because it
/// matches "hours". The manifest's topic_patterns, when present, replace
/// this list.
const DEFAULT_TOPIC_PATTERNS: &[(&str, &str)] = &[
    ("personal_holiday", r"(?i)float|personal\s+holiday|personal\s+day"),
    ("overtime", r"(?i)overtime|\bot\b|time\s+and\s+a\s+half|double\s+time"),
    ("breaks", r"(?i)\bbreaks?\b|\blunch\b|relief\s+period|rest\s+period|meal\s+period"),
    ("sick_leave", r"(?i)\bsick\b"),
    ("premiums", r"(?i)premium|differential"),
    ("vacation", r"(?i)vacation|holiday|\bpto\b|time\s+off"),
    ("discipline", r"(?i)fired|terminat|discharg|write[\s-]?up|written\s+up|suspen|disciplin|just\s+cause"),
    ("grievance", r"(?i)grievance|arbitrat|dispute"),
    ("layoff", r"(?i)laid\s+off|lay\s*off|bumping|recall"),
    ("seniority", r"(?i)seniority|length\s+of\s+service"),
    ("union_rights", r"(?i)steward|union\s+rep|weingarten|representation"),
    ("union_security", r"(?i)\bdues\b|union\s+membership"),
    ("safety", r"(?i)safety|injur|unsafe|hazard"),
    ("benefits", r"(?i)health|insurance|pension|dental|vision|benefit"),
    ("probation", r"(?i)probation"),
    ("store_closing", r"(?i)store\s+clos|severance"),
    ("wages", r"(?i)wage|pay\s+rate|rate\s+of\s+pay|starting\s+pay|\braise\b|salary"),
    ("scheduling", r"(?i)schedul|\bshifts?\b|\bhours\b|workweek"),
];

/// Classifies queries against the manifest's routing configuration
pub struct IntentClassifier {
    topic_patterns: Vec<(String, Regex)>,
    manifest: Manifest,
}

impl IntentClassifier {
    /// Build from a manifest. Manifest topic patterns take priority; the
    /// built-in list is the fallback.
    pub fn new(manifest: Manifest) -> Self {
        let mut topic_patterns: Vec<(String, Regex)> = manifest
            .query_routing
            .topic_patterns
            .iter()
            .filter_map(|tp| {
                Regex::new(&tp.pattern)
                    .map_err(|e| {
                        tracing::warn!("Invalid topic pattern for {}: {}", tp.topic, e);
                        e
                    })
                    .ok()
                    .map(|re| (tp.topic.clone(), re))
            })
            .collect();

        if topic_patterns.is_empty() {
            topic_patterns = DEFAULT_TOPIC_PATTERNS
                .iter()
                .map(|(topic, pattern)| (topic.to_string(), Regex::new(pattern).unwrap()))
                .collect();
        }

        Self {
            topic_patterns,
            manifest,
        }
    }

    /// Classify a query. `user_classification` (from the caller's profile)
    /// overrides classification detection in the query text.
    pub fn classify(&self, query: &str, user_classification: Option<&str>) -> Intent {
        let mut matched_keywords = Vec::new();

        let classification = user_classification
            .map(|c| c.to_lowercase().replace([' ', '-'], "_"))
            .or_else(|| self.detect_classification(query));

        let topic = self.detect_topic(query);

        // Escalation check runs first: an active situation is high-stakes
        // even when wage words appear.
        let active = HIGH_STAKES_ACTIVE
            .iter()
            .find(|pattern| pattern.is_match(query));
        if let Some(pattern) = active {
            if let Some(found) = pattern.find(query) {
                matched_keywords.push(found.as_str().to_string());
            }
            return self.finish(
                IntentType::HighStakes,
                0.95,
                classification,
                topic.or(Some("discipline".to_string())),
                true,
                matched_keywords,
            );
        }

        if self.is_wage_query(query, &mut matched_keywords) {
            return self.finish(
                IntentType::Wage,
                0.9,
                classification,
                topic.or(Some("wages".to_string())),
                false,
                matched_keywords,
            );
        }

        let general = HIGH_STAKES_GENERAL
            .iter()
            .find(|pattern| pattern.is_match(query));
        if let Some(pattern) = general {
            if let Some(found) = pattern.find(query) {
                matched_keywords.push(found.as_str().to_string());
            }
            return self.finish(
                IntentType::HighStakes,
                0.8,
                classification,
                topic,
                false,
                matched_keywords,
            );
        }

        let confidence = if topic.is_some() { 0.7 } else { 0.5 };
        self.finish(
            IntentType::Contract,
            confidence,
            classification,
            topic,
            false,
            matched_keywords,
        )
    }

    fn is_wage_query(&self, query: &str, matched_keywords: &mut Vec<String>) -> bool {
        let mut text = query.to_lowercase();
        for exclusion in WAGE_EXCLUSIONS {
            text = text.replace(exclusion, " ");
        }
        for phrase in WAGE_PHRASES {
            if text.contains(phrase) {
                matched_keywords.push(phrase.to_string());
                return true;
            }
        }
        false
    }

    fn detect_classification(&self, query: &str) -> Option<String> {
        QUERY_CLASSIFICATIONS
            .iter()
            .find(|(_, pattern)| pattern.is_match(query))
            .map(|(name, _)| name.to_string())
    }

    /// First matching pattern wins; the list is priority-ordered
    fn detect_topic(&self, query: &str) -> Option<String> {
        self.topic_patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(query))
            .map(|(topic, _)| topic.clone())
    }

    fn finish(
        &self,
        intent_type: IntentType,
        confidence: f64,
        classification: Option<String>,
        topic: Option<String>,
        requires_escalation: bool,
        matched_keywords: Vec<String>,
    ) -> Intent {
        let mut relevant_articles = Vec::new();
        if let Some(topic) = &topic {
            relevant_articles.extend(self.manifest.articles_for_topic(topic));
        }
        if requires_escalation {
            // Discipline and grievance articles always matter in an active
            // situation, whatever topic matched.
            for topic in ["discipline", "grievance"] {
                relevant_articles.extend(self.manifest.articles_for_topic(topic));
            }
        }
        if let Some(classification) = &classification {
            relevant_articles.extend(self.manifest.articles_for_classification(classification));
        }
        relevant_articles.sort_unstable();
        relevant_articles.dedup();

        Intent {
            intent_type,
            confidence,
            classification,
            topic,
            requires_escalation,
            matched_keywords,
            relevant_articles,
        }
    }
}
