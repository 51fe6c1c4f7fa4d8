//! HTTP mapping for [`MarketError`].
//!
//! Every failure leaves the daemon as `{ "error": ..., "kind": ... }`.
//! Backend details are logged and replaced by a generic message.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rhm_lifecycle::MarketError;
use tracing::error;

use crate::api_types::ErrorResponse;

#[derive(Debug)]
pub struct ApiError(pub MarketError);

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError(MarketError::Unauthorized(msg.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden { .. } => StatusCode::FORBIDDEN,
            MarketError::InvalidState(_) => StatusCode::CONFLICT,
            MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            MarketError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self.0 {
            MarketError::Backend(e) => {
                error!(error = %format!("{e:#}"), "request failed in backend");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error: message,
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError(MarketError::validation(r.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        ApiError(MarketError::validation(r.body_text()))
    }
}

impl From<rhm_schemas::UnknownStatus> for ApiError {
    fn from(e: rhm_schemas::UnknownStatus) -> Self {
        ApiError(e.into())
    }
}

#[cfg(test)]
mod tests {
    use rhm_schemas::Actor;

    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (MarketError::validation("x"), StatusCode::BAD_REQUEST),
            (
                MarketError::Unauthorized("no id".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                MarketError::forbidden(&Actor::tenant(1), "no"),
                StatusCode::FORBIDDEN,
            ),
            (
                MarketError::invalid_state("order", 1, "ACTIVE", "pay"),
                StatusCode::CONFLICT,
            ),
            (MarketError::not_found("order", 1), StatusCode::NOT_FOUND),
            (MarketError::conflict("taken"), StatusCode::CONFLICT),
            (
                MarketError::Backend(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError(err).status_code(), code);
        }
    }

    #[test]
    fn backend_failure_is_internal_error() {
        let resp = ApiError(MarketError::Backend(anyhow::anyhow!(
            "password authentication failed for user rhm"
        )))
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
