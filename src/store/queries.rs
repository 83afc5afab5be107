use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::db::{ScanDb, SCAN_COLUMNS};
use crate::model::{Scan, ScanStatus, Severity};

pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct IssueSummary {
    pub id: i64,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanListItem {
    #[serde(flatten)]
    pub scan: Scan,
    pub issues: Vec<IssueSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanPage {
    pub scans: Vec<ScanListItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_scans: i64,
    pub avg_score: i64,
    pub critical_issues: i64,
    pub scan_credits: i64,
}

/// One page of a user's scans, newest first. `page` is 1-based.
pub fn list_scans(
    db: &ScanDb,
    user_id: &str,
    page: i64,
    limit: i64,
    status: Option<ScanStatus>,
) -> anyhow::Result<ScanPage> {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = (page - 1).saturating_mul(limit);
    let status = status.map(|s| s.as_str());

    let conn = db.conn();

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM scans WHERE user_id=?1 AND (?2 IS NULL OR status=?2)",
        params![user_id, status],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {SCAN_COLUMNS} FROM scans
         WHERE user_id=?1 AND (?2 IS NULL OR status=?2)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3 OFFSET ?4"
    ))?;
    let scans = stmt
        .query_map(params![user_id, status, limit, offset], ScanDb::scan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut issue_stmt = conn.prepare(
        "SELECT id, type, severity, description FROM issues WHERE scan_id=?1 ORDER BY id",
    )?;
    let mut items = Vec::with_capacity(scans.len());
    for scan in scans {
        let issues = issue_stmt
            .query_map(params![scan.id], |row| {
                let severity: String = row.get(2)?;
                Ok(IssueSummary {
                    id: row.get(0)?,
                    issue_type: row.get(1)?,
                    severity: Severity::normalize(&severity),
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        items.push(ScanListItem { scan, issues });
    }

    Ok(ScanPage {
        scans: items,
        pagination: Pagination {
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        },
    })
}

/// Aggregate dashboard numbers for one user.
pub fn user_stats(db: &ScanDb, user_id: &str) -> anyhow::Result<UserStats> {
    let conn = db.conn();

    let total_scans: i64 = conn.query_row(
        "SELECT COUNT(*) FROM scans WHERE user_id=?1",
        params![user_id],
        |row| row.get(0),
    )?;

    let avg_score: Option<f64> = conn.query_row(
        "SELECT AVG(score) FROM scans WHERE user_id=?1 AND status='COMPLETED' AND score IS NOT NULL",
        params![user_id],
        |row| row.get(0),
    )?;

    let critical_issues: i64 = conn.query_row(
        "SELECT COUNT(*) FROM issues i JOIN scans s ON s.id = i.scan_id
         WHERE s.user_id=?1 AND i.severity='CRITICAL'",
        params![user_id],
        |row| row.get(0),
    )?;

    let scan_credits: i64 = conn
        .query_row(
            "SELECT balance FROM user_credits WHERE user_id=?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    Ok(UserStats {
        total_scans,
        avg_score: avg_score.map(|v| v.round() as i64).unwrap_or(0),
        critical_issues,
        scan_credits,
    })
}
