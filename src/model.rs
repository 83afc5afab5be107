use serde::{Deserialize, Serialize};

// ============================================================================
// Enumerations
// ============================================================================

/// Requested strictness tier, analogous to WCAG A/AA/AAA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceLevel {
    #[serde(alias = "A", alias = "a")]
    Minimal,
    #[default]
    #[serde(alias = "AA", alias = "aa")]
    Standard,
    #[serde(alias = "AAA", alias = "aaa")]
    Strict,
}

impl ComplianceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceLevel::Minimal => "minimal",
            ComplianceLevel::Standard => "standard",
            ComplianceLevel::Strict => "strict",
        }
    }

    pub fn wcag_label(&self) -> &'static str {
        match self {
            ComplianceLevel::Minimal => "A",
            ComplianceLevel::Standard => "AA",
            ComplianceLevel::Strict => "AAA",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "minimal" => Some(ComplianceLevel::Minimal),
            "standard" => Some(ComplianceLevel::Standard),
            "strict" => Some(ComplianceLevel::Strict),
            _ => None,
        }
    }
}

/// Scan lifecycle: PENDING -> RUNNING -> {COMPLETED, FAILED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "PENDING",
            ScanStatus::Running => "RUNNING",
            ScanStatus::Completed => "COMPLETED",
            ScanStatus::Failed => "FAILED",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ScanStatus::Pending),
            "RUNNING" => Some(ScanStatus::Running),
            "COMPLETED" => Some(ScanStatus::Completed),
            "FAILED" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// Ordered: Info < Warning < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Map a free-form severity label onto the three-level scale.
    /// Unrecognized labels become `Info`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" | "error" | "high" | "serious" | "severe" | "blocker" => Severity::Critical,
            "warning" | "warn" | "moderate" | "medium" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub level: ComplianceLevel,
    pub status: ScanStatus,
    pub progress: i64,
    pub score: Option<i64>,
    pub insights: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: i64,
    pub scan_id: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub element: String,
    pub recommendation: String,
    pub compliance_reference: String,
}

/// An issue as produced by analysis, before it has a row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDraft {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub element: String,
    pub recommendation: String,
    pub compliance_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWithIssues {
    #[serde(flatten)]
    pub scan: Scan,
    pub issues: Vec<Issue>,
}
