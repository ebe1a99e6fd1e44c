//! API error types with HTTP status mapping (§7 of the design notes).

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use soc_core::SocError;

pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP-facing error type. Each variant maps to one kind from the shared
/// [`SocError`] taxonomy; `From<SocError>` below does the mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg.clone())
            }
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED", "request timed out".to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "an internal error occurred".to_string())
            }
        };

        (status, Json(ErrorResponse { error: ErrorBody { code: code.to_string(), message } })).into_response()
    }
}

/// Maps each `SocError` kind to the HTTP status §7 assigns it. `Unauthorized`
/// has no degraded path at the API boundary (unlike store-level fallbacks),
/// so it surfaces as 503 rather than 401 — the caller didn't fail auth, an
/// upstream credential did.
impl From<SocError> for ApiError {
    fn from(e: SocError) -> Self {
        match e {
            SocError::NotFound(msg) => ApiError::NotFound(msg),
            SocError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SocError::Unauthorized(msg) => ApiError::ServiceUnavailable(msg),
            SocError::Upstream(msg) => ApiError::ServiceUnavailable(msg),
            SocError::IntegrityViolation(msg) => ApiError::Conflict(msg),
            SocError::ApprovalDenied(msg) => ApiError::Forbidden(msg),
            SocError::DeadlineExceeded(_) => ApiError::Timeout,
            SocError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<soc_persist::StorageError> for ApiError {
    fn from(e: soc_persist::StorageError) -> Self {
        match e {
            soc_persist::StorageError::NotFound(msg) => ApiError::NotFound(msg),
            soc_persist::StorageError::AlreadyExists(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<soc_llm::LlmError> for ApiError {
    fn from(e: soc_llm::LlmError) -> Self {
        match e {
            soc_llm::LlmError::ConnectionFailed(msg) => ApiError::ServiceUnavailable(msg),
            soc_llm::LlmError::RateLimited => ApiError::ServiceUnavailable("llm rate limited".to_string()),
            soc_llm::LlmError::NotAvailable => ApiError::ServiceUnavailable("llm provider not available".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn not_found_maps_to_404_with_the_expected_code() {
        let response = ApiError::NotFound("case-1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn integrity_violation_maps_to_conflict() {
        let api_err: ApiError = SocError::IntegrityViolation("hash mismatch".to_string()).into();
        assert!(matches!(api_err, ApiError::Conflict(_)));
    }

    #[test]
    fn approval_denied_maps_to_forbidden() {
        let api_err: ApiError = SocError::ApprovalDenied("rejected".to_string()).into();
        assert!(matches!(api_err, ApiError::Forbidden(_)));
    }
}
