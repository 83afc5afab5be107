use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::config::USER_ID_HEADER;
use crate::error::ApiError;

/// The authenticated caller, taken from the identity header set by the
/// upstream auth proxy. Rejects with 401 when the header is absent or blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl CallerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthenticated)?;
        Ok(CallerId(value.to_string()))
    }
}
