use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::InsightResult;
use crate::model::{IssueDraft, Severity};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());

const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Decoded(InsightResult),
    /// The raw text that failed to match the response schema.
    Malformed(String),
}

#[derive(Deserialize)]
struct WireResult {
    score: f64,
    issues: Vec<WireIssue>,
    insights: String,
}

#[derive(Deserialize)]
struct WireIssue {
    #[serde(rename = "type")]
    issue_type: String,
    #[serde(default)]
    severity: Option<String>,
    description: String,
    #[serde(default)]
    element: Option<String>,
    #[serde(default)]
    recommendation: Option<String>,
    #[serde(default, rename = "complianceReference", alias = "wcagReference")]
    compliance_reference: Option<String>,
}

fn or_na(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_APPLICABLE.to_string(),
    }
}

/// Find the JSON object in a model reply, tolerating markdown fences and
/// surrounding prose.
fn json_span(raw: &str) -> Option<&str> {
    if let Some(caps) = CODE_FENCE.captures(raw) {
        if let Some(inner) = caps.get(1) {
            return Some(inner.as_str());
        }
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Strict decode of the model's reply into a typed result.
pub fn decode(raw: &str) -> DecodeOutcome {
    let Some(span) = json_span(raw) else {
        return DecodeOutcome::Malformed(raw.to_string());
    };
    let wire: WireResult = match serde_json::from_str(span) {
        Ok(wire) => wire,
        Err(_) => return DecodeOutcome::Malformed(raw.to_string()),
    };
    if !wire.score.is_finite() {
        return DecodeOutcome::Malformed(raw.to_string());
    }

    let issues = wire
        .issues
        .into_iter()
        .map(|issue| IssueDraft {
            issue_type: issue.issue_type,
            severity: issue
                .severity
                .as_deref()
                .map(Severity::normalize)
                .unwrap_or(Severity::Info),
            description: issue.description,
            element: or_na(issue.element),
            recommendation: or_na(issue.recommendation),
            compliance_reference: or_na(issue.compliance_reference),
        })
        .collect();

    DecodeOutcome::Decoded(InsightResult {
        score: wire.score.clamp(0.0, 100.0).round() as i64,
        issues,
        insights: wire.insights,
    })
}
