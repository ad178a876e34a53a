//! Regulatory article mapping for blocked decisions.

use crate::domain::models::Violation;

const RECORD_KEEPING: &str = "EU-AIA-12-RecordKeeping";
const HUMAN_OVERSIGHT: &str = "EU-AIA-14-HumanOversight";
const FINANCIAL_SAFETY: &str = "CA-SB243-FinancialSafety";
const TRANSPARENCY: &str = "CA-SB243-Transparency";

fn articles_for(rule_name: &str) -> &'static [&'static str] {
    match rule_name {
        "conservation_of_energy" | "non_negative_energy" | "temperature_range" | "pressure_range" => {
            &[RECORD_KEEPING]
        }
        "leverage_ratio" | "value_at_risk" => &[HUMAN_OVERSIGHT, FINANCIAL_SAFETY],
        _ => &[],
    }
}

/// Articles implicated by `violations`, sorted and de-duplicated.
///
/// Falls back to record keeping and transparency when nothing maps.
pub fn map_violations_to_articles(violations: &[Violation]) -> Vec<String> {
    let mut articles: Vec<&str> = violations
        .iter()
        .flat_map(|v| articles_for(v.rule_name()).iter().copied())
        .collect();
    if articles.is_empty() {
        articles = vec![RECORD_KEEPING, TRANSPARENCY];
    }
    articles.sort_unstable();
    articles.dedup();
    articles.into_iter().map(str::to_string).collect()
}
