use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

use crate::auth::CallerId;
use crate::error::ApiError;
use crate::model::{ComplianceLevel, ScanWithIssues};
use crate::orchestrator::ScanJob;
use crate::scan_log::{ActivityLevel, ActivitySource};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub url: String,
    #[serde(default, alias = "wcagLevel")]
    pub level: ComplianceLevel,
}

fn invalid(path: &str, message: impl Into<String>) -> ApiError {
    let message = message.into();
    let path: Vec<&str> = if path.is_empty() { vec![] } else { vec![path] };
    ApiError::InvalidRequest {
        message: "Invalid request data".to_string(),
        details: Some(serde_json::json!([{ "path": path, "message": message }])),
    }
}

/// Decode and validate an admission body: an absolute http(s) URL and an
/// optional compliance level.
pub fn parse_scan_request(body: &[u8]) -> Result<ScanRequest, ApiError> {
    let mut request: ScanRequest =
        serde_json::from_slice(body).map_err(|e| invalid("", e.to_string()))?;

    request.url = request.url.trim().to_string();
    let parsed = url::Url::parse(&request.url).map_err(|_| invalid("url", "Invalid URL format"))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid("url", "Invalid URL format"));
    }
    Ok(request)
}

/// POST /scan: admit a scan and hand it to the worker pool.
pub async fn start_scan(
    State(state): State<SharedState>,
    caller: CallerId,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = caller.as_str();
    state.ledger.ensure_account(user, state.config.signup_credits)?;
    if state.ledger.balance(user)? <= 0 {
        return Err(ApiError::InsufficientCredits);
    }

    let request = parse_scan_request(&body)?;

    // Queue slot first: a full queue must not cost a credit.
    let slot = state.queue.try_reserve().ok_or(ApiError::QueueFull)?;
    state.ledger.try_reserve(user)?;

    let scan_id = match state.store.create(&request.url, request.level, user) {
        Ok(id) => id,
        Err(e) => {
            if let Err(refund_err) = state.ledger.refund(user) {
                error!("Refund for {} failed after create error: {}", user, refund_err);
            }
            return Err(ApiError::Internal(e));
        }
    };

    slot.submit(ScanJob {
        scan_id: scan_id.clone(),
        url: request.url.clone(),
        level: request.level,
        user_id: user.to_string(),
    });

    info!("Admitted scan {} for {} ({})", scan_id, user, request.url);
    state
        .logs
        .emit_for_scan(
            ActivitySource::Api,
            ActivityLevel::Info,
            &scan_id,
            format!("Admitted {} for user {}", request.url, user),
        )
        .await;

    Ok(Json(serde_json::json!({
        "scanId": scan_id,
        "status": "started",
        "message": "Scan initiated successfully",
    })))
}

#[derive(Debug, Deserialize)]
pub struct ScanIdQuery {
    #[serde(rename = "scanId")]
    pub scan_id: Option<String>,
}

/// GET /scan?scanId=: one scan with its issues, owner only.
pub async fn get_scan(
    State(state): State<SharedState>,
    caller: CallerId,
    Query(query): Query<ScanIdQuery>,
) -> Result<Json<ScanWithIssues>, ApiError> {
    let scan_id = query
        .scan_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(ApiError::MissingScanId)?;

    state
        .store
        .get_with_issues(scan_id.trim(), caller.as_str())?
        .map(Json)
        .ok_or(ApiError::NotFound)
}
