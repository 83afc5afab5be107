use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::SharedState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Only entries recorded for this scan.
    #[serde(rename = "scanId")]
    pub scan_id: Option<String>,
}

fn default_limit() -> usize {
    100
}

/// GET /logs/history: recent activity, newest first, optionally narrowed
/// to one scan's timeline.
pub async fn log_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let scan_id = query.scan_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    let matching: Vec<_> = state
        .logs
        .history()
        .await
        .into_iter()
        .filter(|entry| scan_id.is_none() || entry.scan_id.as_deref() == scan_id)
        .collect();
    let total = matching.len();
    let entries: Vec<_> = matching.into_iter().rev().take(query.limit).collect();

    Json(serde_json::json!({
        "entries": entries,
        "total": total,
        "limit": query.limit,
        "scanId": scan_id,
    }))
}

/// GET /logs/stream: live activity as server-sent events.
pub async fn log_stream(
    State(state): State<SharedState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.logs.subscribe());

    let events = stream.filter_map(|result| match result {
        Ok(entry) => {
            let data = serde_json::to_string(&entry).unwrap_or_default();
            Some(Ok(Event::default().event("activity").data(data)))
        }
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
