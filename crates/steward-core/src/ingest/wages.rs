//! Wage table extraction and lookup
//!
//! The appendix encodes wages as HTML table rows: a `colspan` cell opens a
//! classification, following rows carry a step name plus one dollar column
//! per effective date. Extraction produces a [`WageTable`] keyed by
//! normalized classification name; lookup is deterministic and never guesses
//! beyond the two-way substring fallback on the classification name.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

lazy_static! {
    static ref TABLE_ROW: Regex = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap();
    static ref TABLE_CELL: Regex = Regex::new(r"(?is)<td[^>]*>([^<]*)</td>").unwrap();
    static ref COLSPAN_CELL: Regex = Regex::new(r"(?is)<td\s+[^>]*colspan[^>]*>([^<]+)</td>").unwrap();
    static ref DOLLAR_AMOUNT: Regex = Regex::new(r"\$?([\d,]+\.?\d*)").unwrap();
    static ref HOURS_THRESHOLD: Regex = Regex::new(r"(?i)After\s+(\d+)\s+hours?").unwrap();
    static ref MONTHS_THRESHOLD: Regex = Regex::new(r"(?i)After\s+(\d+)\s+months?").unwrap();
    static ref US_DATE: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").unwrap();
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// A single step in a classification's wage progression.
///
/// Exactly one of `hours_required` / `months_required` is set for
/// progression steps; both are absent for single-rate classifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WageStep {
    pub step_name: String,
    #[serde(default)]
    pub hours_required: Option<u32>,
    #[serde(default)]
    pub months_required: Option<u32>,
    /// Effective date (ISO) -> hourly rate
    pub rates: BTreeMap<String, f64>,
}

impl WageStep {
    /// Ordering threshold; single-rate steps sort first
    fn threshold(&self) -> u32 {
        self.hours_required.or(self.months_required).unwrap_or(0)
    }

    /// Whether the supplied experience satisfies this step's threshold
    fn satisfied_by(&self, hours_worked: u32, months_employed: u32) -> bool {
        match (self.hours_required, self.months_required) {
            (Some(h), _) => hours_worked >= h,
            (None, Some(m)) => months_employed >= m,
            (None, None) => true,
        }
    }
}

/// A job classification with its wage progression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WageClassification {
    pub name: String,
    pub normalized_name: String,
    pub is_manager: bool,
    pub steps: Vec<WageStep>,
}

/// All wage tables for one contract
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WageTable {
    pub contract_id: String,
    /// ISO dates, ascending
    pub effective_dates: Vec<String>,
    pub classifications: BTreeMap<String, WageClassification>,
}

/// Result of a successful wage lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WageLookup {
    pub classification: String,
    pub step: String,
    pub rate: f64,
    pub effective_date: String,
    pub citation: String,
}

/// Normalize a classification name: lowercase, non-alphanumerics collapsed
/// to underscores.
pub fn normalize_classification(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    NON_ALNUM
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

fn parse_rate(text: &str) -> Option<f64> {
    let caps = DOLLAR_AMOUNT.captures(text.trim())?;
    caps[1].replace(',', "").parse().ok()
}

fn parse_step_thresholds(step_name: &str) -> (Option<u32>, Option<u32>) {
    if let Some(caps) = HOURS_THRESHOLD.captures(step_name) {
        return (caps[1].parse().ok(), None);
    }
    if let Some(caps) = MONTHS_THRESHOLD.captures(step_name) {
        return (None, caps[1].parse().ok());
    }
    if step_name.trim().eq_ignore_ascii_case("start") {
        // "Start" is the zero threshold on whichever axis the table uses;
        // hours is the common case and months-based lookups treat 0 the same
        return (Some(0), None);
    }
    (None, None)
}

/// Convert an M/D/YYYY cell to an ISO date string
fn parse_effective_date(cell: &str) -> Option<String> {
    let caps = US_DATE.captures(cell.trim())?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn is_manager_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.contains("MANAGER") || upper.contains("HEAD")
}

/// Extract all wage tables from the contract document.
///
/// Returns an empty table (never an error) when no appendix rows are found;
/// a missing wage table degrades wage lookups to "absent", not ingestion.
pub fn extract_wages(content: &str, contract_id: &str) -> WageTable {
    let mut table = WageTable {
        contract_id: contract_id.to_string(),
        effective_dates: Vec::new(),
        classifications: BTreeMap::new(),
    };

    let mut current: Option<WageClassification> = None;

    for row_caps in TABLE_ROW.captures_iter(content) {
        let row = &row_caps[1];

        // colspan cell opens a new classification
        if let Some(colspan) = COLSPAN_CELL.captures(row) {
            let name = colspan[1].trim().to_string();
            if name.len() > 2 {
                if let Some(finished) = current.take() {
                    if !finished.steps.is_empty() {
                        table
                            .classifications
                            .insert(finished.normalized_name.clone(), finished);
                    }
                }
                current = Some(WageClassification {
                    normalized_name: normalize_classification(&name),
                    is_manager: is_manager_name(&name),
                    name,
                    steps: Vec::new(),
                });
                continue;
            }
        }

        let cells: Vec<String> = TABLE_CELL
            .captures_iter(row)
            .map(|c| c[1].trim().to_string())
            .collect();
        if cells.len() < 2 {
            continue;
        }

        let label = &cells[0];
        if label.to_uppercase().contains("CLASSIFICATION") || label.contains("Effective") {
            continue;
        }

        // A row of M/D/YYYY cells is the effective-date header
        let dates: Vec<String> = cells[1..]
            .iter()
            .filter_map(|c| parse_effective_date(c))
            .collect();
        if !dates.is_empty() && dates.len() == cells.len() - 1 {
            table.effective_dates = dates;
            continue;
        }

        // A row whose every date column parses as a dollar amount is a step
        let rates: Vec<f64> = cells[1..].iter().filter_map(|c| parse_rate(c)).collect();
        if rates.is_empty() || rates.len() != cells.len() - 1 {
            continue;
        }
        if table.effective_dates.len() != rates.len() {
            // Date header not seen yet or column mismatch; key by position
            if table.effective_dates.is_empty() {
                table.effective_dates = (0..rates.len()).map(|i| format!("year_{}", i + 1)).collect();
            } else {
                continue;
            }
        }

        let rate_map: BTreeMap<String, f64> = table
            .effective_dates
            .iter()
            .cloned()
            .zip(rates.iter().copied())
            .collect();

        match current.as_mut() {
            Some(class) => {
                let (hours, months) = parse_step_thresholds(label);
                class.steps.push(WageStep {
                    step_name: label.clone(),
                    hours_required: hours,
                    months_required: months,
                    rates: rate_map,
                });
            }
            None => {
                // Rate row outside any open classification: a single-rate
                // classification (manager positions in the reference table)
                let normalized = normalize_classification(label);
                table.classifications.insert(
                    normalized.clone(),
                    WageClassification {
                        name: label.clone(),
                        normalized_name: normalized,
                        is_manager: is_manager_name(label),
                        steps: vec![WageStep {
                            step_name: "Rate".to_string(),
                            hours_required: None,
                            months_required: None,
                            rates: rate_map,
                        }],
                    },
                );
            }
        }
    }

    if let Some(finished) = current.take() {
        if !finished.steps.is_empty() {
            table
                .classifications
                .insert(finished.normalized_name.clone(), finished);
        }
    }

    // Steps walk in ascending threshold order during lookup
    for class in table.classifications.values_mut() {
        class.steps.sort_by_key(WageStep::threshold);
    }

    table
}

impl WageTable {
    /// Select the effective date: the latest table date <= the request date,
    /// defaulting to the latest available.
    fn select_effective_date(&self, requested: Option<&str>) -> Option<String> {
        let latest = self.effective_dates.last()?.clone();
        let requested = match requested {
            Some(r) => r,
            None => return Some(latest),
        };
        let req_date = match NaiveDate::parse_from_str(requested, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => return Some(latest),
        };
        let mut best: Option<String> = None;
        for date_str in &self.effective_dates {
            if let Ok(d) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
                if d <= req_date {
                    best = Some(date_str.clone());
                }
            }
        }
        best.or(Some(latest))
    }

    /// Resolve a classification key, falling back to a two-way substring match
    fn resolve_classification(&self, classification: &str) -> Option<&WageClassification> {
        let normalized = normalize_classification(classification);
        if let Some(class) = self.classifications.get(&normalized) {
            return Some(class);
        }
        self.classifications
            .iter()
            .find(|(key, _)| key.contains(&normalized) || normalized.contains(key.as_str()))
            .map(|(_, class)| class)
    }

    /// Deterministic wage lookup.
    ///
    /// The applicable step is the highest step whose threshold is satisfied
    /// by the supplied hours or months. Returns `None` (not an error) when
    /// the classification or rate is absent.
    pub fn lookup(
        &self,
        classification: &str,
        hours_worked: u32,
        months_employed: u32,
        effective_date: Option<&str>,
    ) -> Option<WageLookup> {
        let class = self.resolve_classification(classification)?;
        let date = self.select_effective_date(effective_date)?;

        let mut applicable = class.steps.first()?;
        for step in &class.steps {
            if step.satisfied_by(hours_worked, months_employed) {
                applicable = step;
            }
        }

        let rate = *applicable.rates.get(&date)?;
        Some(WageLookup {
            classification: class.name.clone(),
            step: applicable.step_name.clone(),
            rate,
            effective_date: date,
            citation: "Appendix A".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_appendix() -> String {
        let mut doc = String::from(
            "<table>\n<tr><td>CLASSIFICATION</td><td>Effective</td><td>Effective</td><td>Effective</td></tr>\n\
             <tr><td></td><td>1/23/2022</td><td>1/22/2023</td><td>1/21/2024</td></tr>\n\
             <tr><td>HEAD CLERK</td><td>$26.05</td><td>$27.30</td><td>$28.40</td></tr>\n\
             <tr><td colspan=\"4\">ALL PURPOSE CLERK</td></tr>\n\
             <tr><td>Start</td><td>$16.00</td><td>$17.00</td><td>$17.75</td></tr>\n\
             <tr><td>After 2080 hours</td><td>$17.10</td><td>$18.10</td><td>$18.85</td></tr>\n\
             <tr><td>After 4160 hours</td><td>$18.45</td><td>$19.45</td><td>$20.20</td></tr>\n\
             <tr><td>After 6240 hours</td><td>$20.80</td><td>$21.80</td><td>$22.55</td></tr>\n\
             <tr><td colspan=\"4\">COURTESY CLERK</td></tr>\n\
             <tr><td>Start</td><td>$13.10</td><td>$14.10</td><td>$14.85</td></tr>\n\
             <tr><td>After 12 months</td><td>$13.45</td><td>$14.45</td><td>$15.20</td></tr>\n\
             <tr><td>After 36 months</td><td>$14.05</td><td>$15.05</td><td>$15.80</td></tr>\n\
             </table>\n",
        );
        doc.push('\n');
        doc
    }

    #[test]
    fn test_extract_finds_classifications_and_dates() {
        let table = extract_wages(&sample_appendix(), "test_contract");
        assert_eq!(
            table.effective_dates,
            vec!["2022-01-23", "2023-01-22", "2024-01-21"]
        );
        assert_eq!(table.classifications.len(), 3);
        assert!(table.classifications.contains_key("all_purpose_clerk"));
        assert!(table.classifications.contains_key("courtesy_clerk"));
        assert!(table.classifications.contains_key("head_clerk"));
    }

    #[test]
    fn test_single_rate_classification_outside_colspan() {
        let table = extract_wages(&sample_appendix(), "test_contract");
        let head = &table.classifications["head_clerk"];
        assert!(head.is_manager);
        assert_eq!(head.steps.len(), 1);
        assert_eq!(head.steps[0].step_name, "Rate");
        assert_eq!(head.steps[0].hours_required, None);
        assert_eq!(head.steps[0].months_required, None);
    }

    #[test]
    fn test_lookup_selects_highest_satisfied_step() {
        let table = extract_wages(&sample_appendix(), "test_contract");

        let result = table.lookup("all_purpose_clerk", 5000, 0, None).unwrap();
        assert_eq!(result.step, "After 4160 hours");
        assert_eq!(result.rate, 20.20);
        assert_eq!(result.effective_date, "2024-01-21");
        assert_eq!(result.citation, "Appendix A");

        let start = table.lookup("all_purpose_clerk", 0, 0, None).unwrap();
        assert_eq!(start.step, "Start");

        let top = table.lookup("all_purpose_clerk", 10000, 0, None).unwrap();
        assert_eq!(top.step, "After 6240 hours");
    }

    #[test]
    fn test_lookup_month_based_progression() {
        let table = extract_wages(&sample_appendix(), "test_contract");
        let result = table.lookup("courtesy_clerk", 0, 48, None).unwrap();
        assert_eq!(result.step, "After 36 months");
        assert_eq!(result.rate, 15.80);
    }

    #[test]
    fn test_lookup_effective_date_selection() {
        let table = extract_wages(&sample_appendix(), "test_contract");

        // Mid-term date picks the latest date at or before it
        let mid = table
            .lookup("all_purpose_clerk", 0, 0, Some("2023-06-01"))
            .unwrap();
        assert_eq!(mid.effective_date, "2023-01-22");
        assert_eq!(mid.rate, 17.00);

        // Before the first effective date falls back to the latest
        let early = table
            .lookup("all_purpose_clerk", 0, 0, Some("2020-01-01"))
            .unwrap();
        assert_eq!(early.effective_date, "2024-01-21");
    }

    #[test]
    fn test_lookup_substring_fallback_and_absent() {
        let table = extract_wages(&sample_appendix(), "test_contract");

        let result = table.lookup("courtesy", 0, 0, None);
        assert!(result.is_some());
        assert_eq!(result.unwrap().classification, "COURTESY CLERK");

        assert!(table.lookup("pharmacist", 0, 0, None).is_none());
    }

    #[test]
    fn test_normalize_classification() {
        assert_eq!(
            normalize_classification("NON-FOOD/GM/FLORAL"),
            "non_food_gm_floral"
        );
        assert_eq!(normalize_classification("  Head Clerk  "), "head_clerk");
        assert_eq!(
            normalize_classification("5-STAR CAKE DECORATOR"),
            "5_star_cake_decorator"
        );
    }

    #[test]
    fn test_missing_appendix_yields_empty_table() {
        let table = extract_wages("No tables here.", "test_contract");
        assert!(table.classifications.is_empty());
        assert!(table.lookup("all_purpose_clerk", 0, 0, None).is_none());
    }

    #[test]
    fn test_steps_sorted_ascending_by_threshold() {
        let html = "<tr><td></td><td>1/23/2022</td></tr>\n\
                    <tr><td colspan=\"2\">BAKERY CLERK</td></tr>\n\
                    <tr><td>After 4160 hours</td><td>$19.00</td></tr>\n\
                    <tr><td>Start</td><td>$15.00</td></tr>\n\
                    <tr><td>After 2080 hours</td><td>$17.00</td></tr>\n";
        let table = extract_wages(html, "test_contract");
        let steps = &table.classifications["bakery_clerk"].steps;
        let thresholds: Vec<u32> = steps.iter().map(|s| s.hours_required.unwrap()).collect();
        assert_eq!(thresholds, vec![0, 2080, 4160]);
    }
}
