use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{now_ts, ScanStore, StaleTransition};
use crate::model::{ComplianceLevel, Issue, IssueDraft, Scan, ScanStatus, ScanWithIssues, Severity};

pub const SCAN_COLUMNS: &str =
    "id, user_id, url, level, status, progress, score, insights, created_at, completed_at";

pub struct ScanDb {
    conn: Mutex<Connection>,
}

impl ScanDb {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS scans (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                url TEXT NOT NULL,
                level TEXT NOT NULL DEFAULT 'standard',
                status TEXT NOT NULL DEFAULT 'PENDING',
                progress INTEGER NOT NULL DEFAULT 0,
                score INTEGER,
                insights TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS issues (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scan_id TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
                type TEXT NOT NULL,
                severity TEXT NOT NULL,
                description TEXT NOT NULL,
                element TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                compliance_reference TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_credits (
                user_id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_scans_user_created ON scans(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status);
            CREATE INDEX IF NOT EXISTS idx_issues_scan_id ON issues(scan_id);
        ",
        )?;
        Self::migrate_updated_at(&conn)?;
        Ok(())
    }

    /// Databases created before `updated_at` existed get the column added.
    fn migrate_updated_at(conn: &Connection) -> anyhow::Result<()> {
        if let Err(e) = conn.execute("ALTER TABLE scans ADD COLUMN updated_at TEXT", []) {
            if !e.to_string().contains("duplicate column") {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Poisoning only means another thread panicked mid-statement; SQLite
    /// itself is still consistent, so keep serving.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Fail every non-terminal scan. Used at startup, when nothing can still
    /// be working on them.
    pub fn fail_orphans(&self, message: &str) -> anyhow::Result<usize> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE scans SET status='FAILED', progress=0, score=NULL, insights=?1
             WHERE status IN ('PENDING', 'RUNNING')",
            params![message],
        )?;
        Ok(n)
    }

    /// Fail RUNNING scans whose last checkpoint is older than `cutoff`.
    /// PENDING scans are still waiting in the queue and are left alone.
    pub fn fail_stale(&self, cutoff: DateTime<Utc>, message: &str) -> anyhow::Result<usize> {
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE scans SET status='FAILED', progress=0, score=NULL, insights=?2
             WHERE status='RUNNING' AND COALESCE(updated_at, created_at) < ?1",
            params![cutoff.to_rfc3339_opts(SecondsFormat::Millis, true), message],
        )?;
        Ok(n)
    }

    // ========================================================================
    // Row helpers
    // ========================================================================

    pub fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<Scan> {
        let level: String = row.get(3)?;
        let status: String = row.get(4)?;
        Ok(Scan {
            id: row.get(0)?,
            user_id: row.get(1)?,
            url: row.get(2)?,
            level: ComplianceLevel::from_db(&level).unwrap_or_default(),
            status: ScanStatus::from_db(&status).unwrap_or(ScanStatus::Failed),
            progress: row.get(5)?,
            score: row.get(6)?,
            insights: row.get(7)?,
            created_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }

    fn issues_for(conn: &Connection, scan_id: &str) -> anyhow::Result<Vec<Issue>> {
        let mut stmt = conn.prepare(
            "SELECT id, scan_id, type, severity, description, element, recommendation, compliance_reference
             FROM issues WHERE scan_id=?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![scan_id], |row| {
            let severity: String = row.get(3)?;
            Ok(Issue {
                id: row.get(0)?,
                scan_id: row.get(1)?,
                issue_type: row.get(2)?,
                severity: Severity::normalize(&severity),
                description: row.get(4)?,
                element: row.get(5)?,
                recommendation: row.get(6)?,
                compliance_reference: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl ScanStore for ScanDb {
    fn create(&self, url: &str, level: ComplianceLevel, user_id: &str) -> anyhow::Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scans (id, user_id, url, level, status, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'PENDING', 0, ?5, ?5)",
            params![id, user_id, url, level.as_str(), now_ts()],
        )?;
        Ok(id)
    }

    fn update_progress(&self, scan_id: &str, progress: i64, message: &str) -> anyhow::Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE scans SET status='RUNNING', progress=?2, insights=?3, updated_at=?4
             WHERE id=?1 AND status IN ('PENDING', 'RUNNING') AND progress <= ?2",
            params![scan_id, progress.clamp(0, 100), message, now_ts()],
        )?;
        if updated == 0 {
            return Err(StaleTransition::new(scan_id, "progress update").into());
        }
        Ok(())
    }

    fn append_issues(&self, scan_id: &str, issues: &[IssueDraft]) -> anyhow::Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let running: bool = tx
            .query_row(
                "SELECT status FROM scans WHERE id=?1",
                params![scan_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .is_some_and(|s| s == ScanStatus::Running.as_str());
        if !running {
            return Err(StaleTransition::new(scan_id, "issue batch").into());
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO issues (scan_id, type, severity, description, element, recommendation, compliance_reference)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for issue in issues {
                stmt.execute(params![
                    scan_id,
                    issue.issue_type,
                    issue.severity.as_str(),
                    issue.description,
                    issue.element,
                    issue.recommendation,
                    issue.compliance_reference,
                ])?;
            }
        }

        tx.commit()?;
        Ok(issues.len())
    }

    fn complete(&self, scan_id: &str, score: i64, insights: &str) -> anyhow::Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE scans SET status='COMPLETED', progress=100, score=?2, insights=?3, completed_at=?4
             WHERE id=?1 AND status='RUNNING'",
            params![scan_id, score.clamp(0, 100), insights, now_ts()],
        )?;
        if updated == 0 {
            return Err(StaleTransition::new(scan_id, "completion").into());
        }
        Ok(())
    }

    fn fail(&self, scan_id: &str, message: &str) -> anyhow::Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE scans SET status='FAILED', progress=0, score=NULL, insights=?2
             WHERE id=?1 AND status IN ('PENDING', 'RUNNING')",
            params![scan_id, message],
        )?;
        if updated == 0 {
            return Err(StaleTransition::new(scan_id, "failure").into());
        }
        Ok(())
    }

    fn get_with_issues(
        &self,
        scan_id: &str,
        requesting_user_id: &str,
    ) -> anyhow::Result<Option<ScanWithIssues>> {
        let conn = self.conn();
        let scan = conn
            .query_row(
                &format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id=?1 AND user_id=?2"),
                params![scan_id, requesting_user_id],
                Self::scan_from_row,
            )
            .optional()?;

        match scan {
            Some(scan) => {
                let issues = Self::issues_for(&conn, &scan.id)?;
                Ok(Some(ScanWithIssues { scan, issues }))
            }
            None => Ok(None),
        }
    }
}
