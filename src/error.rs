use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::credits::LedgerError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Insufficient scan credits")]
    InsufficientCredits,

    #[error("{message}")]
    InvalidRequest {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Scan ID required")]
    MissingScanId,

    #[error("Scan not found")]
    NotFound,

    #[error("Scan queue is full, try again later")]
    QueueFull,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientCredits => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::MissingScanId => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientCredits => ApiError::InsufficientCredits,
            LedgerError::Store(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            ApiError::InvalidRequest {
                details: Some(details),
                ..
            } => serde_json::json!({
                "error": self.to_string(),
                "details": details,
            }),
            // Internal details stay in the server log.
            ApiError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                serde_json::json!({ "error": "Internal server error" })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}
