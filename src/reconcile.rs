use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::RECONCILE_INTERVAL_SECS;
use crate::scan_log::{ActivityLevel, ActivitySource, ScanLog};
use crate::store::ScanDb;

pub const INTERRUPTED_MESSAGE: &str = "Scan interrupted before completion";

/// Fail scans left non-terminal by a previous process. The queue lives in
/// memory, so at startup nothing can still be working on them.
pub async fn fail_orphans_at_startup(db: &ScanDb, logs: &ScanLog) -> anyhow::Result<usize> {
    let n = db.fail_orphans(INTERRUPTED_MESSAGE)?;
    if n > 0 {
        warn!("Reconciler: failed {} orphaned scans from a previous run", n);
        logs.emit(
            ActivitySource::Reconciler,
            ActivityLevel::Warn,
            format!("Failed {} scans orphaned by a previous run", n),
        )
        .await;
    }
    Ok(n)
}

/// One sweep: fail RUNNING scans with no checkpoint for `stale_after`.
/// Queued scans are only reconciled at startup.
pub async fn sweep_stale(db: &ScanDb, logs: &ScanLog, stale_after: Duration) -> anyhow::Result<usize> {
    let age = chrono::Duration::from_std(stale_after)?;
    let cutoff = Utc::now() - age;
    let n = db.fail_stale(cutoff, INTERRUPTED_MESSAGE)?;
    if n > 0 {
        warn!("Reconciler: failed {} stale scans", n);
        logs.emit(
            ActivitySource::Reconciler,
            ActivityLevel::Warn,
            format!(
                "Failed {} scans with no progress for {}s",
                n,
                stale_after.as_secs()
            ),
        )
        .await;
    }
    Ok(n)
}

/// Spawn the periodic stale-scan sweep.
pub fn spawn_reconciler(
    db: Arc<ScanDb>,
    logs: Arc<ScanLog>,
    stale_after: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Reconciler started (every {}s, stale after {}s)",
            RECONCILE_INTERVAL_SECS,
            stale_after.as_secs()
        );
        let interval = Duration::from_secs(RECONCILE_INTERVAL_SECS);

        loop {
            sleep(interval).await;

            if let Err(e) = sweep_stale(&db, &logs, stale_after).await {
                error!("Reconciler sweep failed: {:#}", e);
                logs.emit(
                    ActivitySource::Reconciler,
                    ActivityLevel::Error,
                    format!("Sweep failed: {}", e),
                )
                .await;
            }
        }
    })
}
