//! Drives one scan from PENDING to a terminal state.
//!
//! Stages run strictly in order: launch, navigate, capture, analyze,
//! persist. Every stage boundary is a persisted progress checkpoint.

pub mod queue;

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub use queue::{JobSlot, QueueStats, ScanJob, ScanQueue};

use crate::config::NAVIGATION_TIMEOUT_SECS;
use crate::extractor::{BrowserSession, ExtractionError, PageExtractor};
use crate::insight::InsightGenerator;
use crate::scan_log::{ActivityLevel, ActivitySource, ScanLog};
use crate::store::ScanStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Initializing,
    Loading,
    Analyzing,
    AiAnalysis,
    Reporting,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 5] = [
        Checkpoint::Initializing,
        Checkpoint::Loading,
        Checkpoint::Analyzing,
        Checkpoint::AiAnalysis,
        Checkpoint::Reporting,
    ];

    pub fn progress(&self) -> i64 {
        match self {
            Checkpoint::Initializing => 10,
            Checkpoint::Loading => 25,
            Checkpoint::Analyzing => 50,
            Checkpoint::AiAnalysis => 75,
            Checkpoint::Reporting => 90,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Checkpoint::Initializing => "Initializing browser...",
            Checkpoint::Loading => "Loading webpage...",
            Checkpoint::Analyzing => "Analyzing accessibility...",
            Checkpoint::AiAnalysis => "Running AI analysis...",
            Checkpoint::Reporting => "Generating report...",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { score: i64, issues: usize },
    /// Extraction failed; the scan was recorded as FAILED with this message.
    Failed(String),
    /// A persistence write failed and the run stopped.
    Aborted(String),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

pub struct Orchestrator {
    store: Arc<dyn ScanStore>,
    extractor: Arc<dyn PageExtractor>,
    generator: InsightGenerator,
    logs: Arc<ScanLog>,
    navigation_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ScanStore>,
        extractor: Arc<dyn PageExtractor>,
        generator: InsightGenerator,
        logs: Arc<ScanLog>,
    ) -> Self {
        Self {
            store,
            extractor,
            generator,
            logs,
            navigation_timeout: Duration::from_secs(NAVIGATION_TIMEOUT_SECS),
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub async fn run(&self, job: &ScanJob) -> RunOutcome {
        info!("Scan {} started for {}", job.scan_id, job.url);
        self.logs
            .emit_for_scan(
                ActivitySource::Orchestrator,
                ActivityLevel::Info,
                &job.scan_id,
                format!("Scanning {} at level {}", job.url, job.level.as_str()),
            )
            .await;

        match self.execute(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Scan {} aborted on persistence error: {:#}", job.scan_id, e);
                self.logs
                    .emit_for_scan(
                        ActivitySource::Orchestrator,
                        ActivityLevel::Error,
                        &job.scan_id,
                        format!("Run aborted: {}", e),
                    )
                    .await;
                // Best effort; the reconciler covers the case where this fails too.
                if let Err(fail_err) = self.store.fail(&job.scan_id, &format!("Scan failed: {}", e)) {
                    warn!("Could not mark scan {} failed: {}", job.scan_id, fail_err);
                }
                RunOutcome::Aborted(e.to_string())
            }
        }
    }

    async fn execute(&self, job: &ScanJob) -> anyhow::Result<RunOutcome> {
        self.checkpoint(job, Checkpoint::Initializing)?;

        let mut session = match self.extractor.launch().await {
            Ok(session) => session,
            Err(e) => return self.fail_extraction(job, e).await,
        };

        let result = self.drive(job, session.as_mut()).await;
        // Released on every path; Drop covers panics.
        session.close().await;
        result
    }

    async fn drive(
        &self,
        job: &ScanJob,
        session: &mut dyn BrowserSession,
    ) -> anyhow::Result<RunOutcome> {
        self.checkpoint(job, Checkpoint::Loading)?;
        if let Err(e) = session.navigate(&job.url, self.navigation_timeout).await {
            return self.fail_extraction(job, e).await;
        }

        self.checkpoint(job, Checkpoint::Analyzing)?;
        let snapshot = match session.capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.fail_extraction(job, e).await,
        };
        self.logs
            .emit_for_scan(
                ActivitySource::Extractor,
                ActivityLevel::Debug,
                &job.scan_id,
                format!(
                    "Captured {} images, {} links, {} buttons, {} forms, {} headings, {} inputs",
                    snapshot.images.len(),
                    snapshot.links.len(),
                    snapshot.buttons.len(),
                    snapshot.forms.len(),
                    snapshot.headings.len(),
                    snapshot.inputs.len()
                ),
            )
            .await;

        self.checkpoint(job, Checkpoint::AiAnalysis)?;
        let generation = self.generator.generate(&snapshot, job.level).await;
        if let Some(reason) = &generation.fallback_reason {
            self.logs
                .emit_for_scan(
                    ActivitySource::Inference,
                    ActivityLevel::Warn,
                    &job.scan_id,
                    format!("Using fallback result: {}", reason),
                )
                .await;
        }

        self.checkpoint(job, Checkpoint::Reporting)?;
        let result = generation.result;
        let written = self.store.append_issues(&job.scan_id, &result.issues)?;
        self.store
            .complete(&job.scan_id, result.score, &result.insights)?;

        info!(
            "Scan {} completed: score {}, {} issues",
            job.scan_id, result.score, written
        );
        self.logs
            .emit_for_scan(
                ActivitySource::Orchestrator,
                ActivityLevel::Info,
                &job.scan_id,
                format!("Completed with score {} and {} issues", result.score, written),
            )
            .await;

        Ok(RunOutcome::Completed {
            score: result.score,
            issues: written,
        })
    }

    fn checkpoint(&self, job: &ScanJob, checkpoint: Checkpoint) -> anyhow::Result<()> {
        self.store
            .update_progress(&job.scan_id, checkpoint.progress(), checkpoint.message())
    }

    async fn fail_extraction(
        &self,
        job: &ScanJob,
        e: ExtractionError,
    ) -> anyhow::Result<RunOutcome> {
        let message = format!("Scan failed: {}", e);
        warn!("Scan {}: {}", job.scan_id, message);
        self.store.fail(&job.scan_id, &message)?;
        self.logs
            .emit_for_scan(
                ActivitySource::Extractor,
                ActivityLevel::Error,
                &job.scan_id,
                message.clone(),
            )
            .await;
        Ok(RunOutcome::Failed(message))
    }
}
