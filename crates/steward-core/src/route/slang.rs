//! Slang expansion
//!
//! Bridges worker vocabulary to contract terminology before keyword search.
//! Two layers: a universal table of domain-standard synonyms, overlaid by
//! the manifest's contract-specific map. Expansion appends the contract
//! phrase in parentheses rather than replacing anything, so the original
//! wording always survives: "do i get float days?" becomes
//! "do i get float days? (personal holiday)".

use crate::ingest::manifest::Manifest;
use regex::Regex;

/// Universal layer: worker term -> contract phrase
const UNIVERSAL_SLANG: &[(&str, &str)] = &[
    ("float days", "personal holiday"),
    ("float day", "personal holiday"),
    ("floater", "personal holiday"),
    ("personal day", "personal holiday"),
    ("ot", "overtime"),
    ("time and a half", "overtime premium pay"),
    ("fired", "discharge termination"),
    ("canned", "discharge termination"),
    ("let go", "discharge termination layoff"),
    ("write up", "discipline warning"),
    ("written up", "discipline warning"),
    ("break", "rest period relief period"),
    ("lunch", "meal period"),
    ("laid off", "layoff recall"),
    ("bumping", "seniority displacement"),
    ("steward", "union representative"),
    ("union rep", "union representative"),
    ("pay raise", "wage progression step increase"),
    ("raise", "wage progression step increase"),
    ("paycheck", "wages rate of pay"),
    ("pto", "vacation personal holiday"),
    ("call in sick", "sick leave"),
    ("call out", "sick leave"),
    ("vendor", "work jurisdiction bargaining unit work"),
    ("seniority list", "seniority roster"),
];

/// Two-layer slang expander; manifest entries override universal ones
pub struct SlangExpander {
    /// (worker term, contract phrase, compiled word-boundary pattern),
    /// longest term first
    entries: Vec<(String, String, Regex)>,
}

impl SlangExpander {
    /// Universal layer only
    pub fn new() -> Self {
        Self::with_manifest_layer(&Default::default())
    }

    /// Universal layer overlaid with the manifest's contract-specific map
    pub fn with_manifest_layer(manifest: &Manifest) -> Self {
        let mut layered: Vec<(String, String)> = UNIVERSAL_SLANG
            .iter()
            .map(|(term, phrase)| (term.to_string(), phrase.to_string()))
            .collect();

        for (term, phrase) in &manifest.query_routing.slang_to_contract {
            let term = term.to_lowercase();
            match layered.iter_mut().find(|(t, _)| *t == term) {
                Some(entry) => entry.1 = phrase.clone(),
                None => layered.push((term, phrase.clone())),
            }
        }

        // Longest-match first so "float days" wins over "float day"
        layered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let entries = layered
            .into_iter()
            .filter_map(|(term, phrase)| {
                let pattern = format!(r"\b{}\b", regex::escape(&term));
                Regex::new(&pattern).ok().map(|re| (term, phrase, re))
            })
            .collect();

        Self { entries }
    }

    /// Contract phrases for every slang term present in the query,
    /// longest-match first, deduplicated. Terms covered by an already
    /// matched longer term are skipped.
    pub fn expansion_terms(&self, query: &str) -> Vec<String> {
        let query_lower = query.to_lowercase();
        let mut matched_spans: Vec<(usize, usize)> = Vec::new();
        let mut phrases: Vec<String> = Vec::new();

        for (_, phrase, pattern) in &self.entries {
            for found in pattern.find_iter(&query_lower) {
                let span = (found.start(), found.end());
                let covered = matched_spans
                    .iter()
                    .any(|(start, end)| span.0 >= *start && span.1 <= *end);
                if covered {
                    continue;
                }
                matched_spans.push(span);
                if !phrases.contains(phrase) {
                    phrases.push(phrase.clone());
                }
            }
        }

        phrases
    }

    /// Expand a query by appending matched contract phrases in parentheses.
    /// The original query is always a prefix of the result.
    pub fn expand(&self, query: &str) -> String {
        let phrases = self.expansion_terms(query);
        if phrases.is_empty() {
            return query.to_string();
        }

        let mut expanded = query.to_string();
        for phrase in phrases {
            expanded.push_str(&format!(" ({})", phrase));
        }
        expanded
    }
}

impl Default for SlangExpander {
    fn default() -> Self {
        Self::new()
    }
}
