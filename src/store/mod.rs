pub mod db;
pub mod queries;

use crate::model::{ComplianceLevel, IssueDraft, ScanWithIssues};

pub use db::ScanDb;

/// Narrow persistence interface used by admission and the orchestrator.
///
/// Ownership is enforced here: `get_with_issues` only returns a scan whose
/// owner matches the requesting user.
pub trait ScanStore: Send + Sync {
    /// Insert a PENDING scan with progress 0 and return its id.
    fn create(&self, url: &str, level: ComplianceLevel, user_id: &str) -> anyhow::Result<String>;

    /// Checkpoint write. Moves PENDING to RUNNING; rejects lower progress
    /// values and terminal scans with [`StaleTransition`].
    fn update_progress(&self, scan_id: &str, progress: i64, message: &str) -> anyhow::Result<()>;

    /// Insert the whole batch in one transaction. Returns rows written.
    fn append_issues(&self, scan_id: &str, issues: &[IssueDraft]) -> anyhow::Result<usize>;

    fn complete(&self, scan_id: &str, score: i64, insights: &str) -> anyhow::Result<()>;

    fn fail(&self, scan_id: &str, message: &str) -> anyhow::Result<()>;

    fn get_with_issues(
        &self,
        scan_id: &str,
        requesting_user_id: &str,
    ) -> anyhow::Result<Option<ScanWithIssues>>;
}

/// A guarded write matched no row: the scan is missing, already terminal,
/// or the update would move progress backwards.
#[derive(Debug, thiserror::Error)]
#[error("scan {scan_id} rejected {operation}: not found or not in an accepting state")]
pub struct StaleTransition {
    pub scan_id: String,
    pub operation: &'static str,
}

impl StaleTransition {
    pub fn new(scan_id: &str, operation: &'static str) -> Self {
        Self {
            scan_id: scan_id.to_string(),
            operation,
        }
    }
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
