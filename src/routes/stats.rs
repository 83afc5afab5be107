use axum::extract::State;
use axum::Json;

use crate::auth::CallerId;
use crate::error::ApiError;
use crate::state::SharedState;
use crate::store::queries::{self, UserStats};

/// GET /user/stats: dashboard aggregates for the caller.
pub async fn user_stats(
    State(state): State<SharedState>,
    caller: CallerId,
) -> Result<Json<UserStats>, ApiError> {
    // First sight of a user opens their free-tier account.
    state
        .ledger
        .ensure_account(caller.as_str(), state.config.signup_credits)?;
    Ok(Json(queries::user_stats(&state.db, caller.as_str())?))
}
