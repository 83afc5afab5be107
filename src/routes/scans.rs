use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auth::CallerId;
use crate::error::ApiError;
use crate::model::ScanStatus;
use crate::state::SharedState;
use crate::store::queries::{self, ScanPage};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub status: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

/// GET /scans: the caller's scans, newest first.
pub async fn list_scans(
    State(state): State<SharedState>,
    caller: CallerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<ScanPage>, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            ScanStatus::from_db(&raw.to_ascii_uppercase())
                .ok_or_else(|| ApiError::invalid(format!("Unknown status filter: {}", raw)))?,
        ),
    };

    let page = queries::list_scans(&state.db, caller.as_str(), query.page, query.limit, status)?;
    Ok(Json(page))
}
