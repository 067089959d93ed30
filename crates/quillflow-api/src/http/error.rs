//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use quillflow_types::error::{EnvelopeError, RepositoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Envelope and workflow errors from the core.
    Envelope(EnvelopeError),
    /// Authentication failure.
    Unauthorized(String),
    /// Malformed request input (path ids, query values).
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<EnvelopeError> for AppError {
    fn from(e: EnvelopeError) -> Self {
        AppError::Envelope(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Envelope(e.into())
    }
}

impl AppError {
    /// HTTP status, machine-readable code, and message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Envelope(EnvelopeError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Envelope(EnvelopeError::BusinessLogic(msg)) => {
                (StatusCode::CONFLICT, "INVALID_STATE", msg.clone())
            }
            AppError::Envelope(EnvelopeError::Concurrency(msg)) => {
                (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT", msg.clone())
            }
            AppError::Envelope(EnvelopeError::NotFound) => {
                (StatusCode::NOT_FOUND, "ENVELOPE_NOT_FOUND", "Envelope not found".to_string())
            }
            AppError::Envelope(EnvelopeError::Forbidden(msg)) => {
                (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone())
            }
            AppError::Envelope(EnvelopeError::Storage(msg)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", msg.clone())
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(code, %message, "Request failed");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
                "retryable": matches!(&self, AppError::Envelope(e) if e.is_retryable()),
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_errors_map_to_status_codes() {
        let cases = [
            (EnvelopeError::Validation("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (EnvelopeError::BusinessLogic("x".into()), StatusCode::CONFLICT, "INVALID_STATE"),
            (EnvelopeError::Concurrency("x".into()), StatusCode::CONFLICT, "CONCURRENCY_CONFLICT"),
            (EnvelopeError::NotFound, StatusCode::NOT_FOUND, "ENVELOPE_NOT_FOUND"),
            (EnvelopeError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (EnvelopeError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        ];
        for (err, status, code) in cases {
            let (got_status, got_code, _) = AppError::from(err).parts();
            assert_eq!(got_status, status);
            assert_eq!(got_code, code);
        }
    }

    #[test]
    fn test_repository_conflict_is_concurrency() {
        let err = AppError::from(RepositoryError::Conflict("stale".into()));
        assert_eq!(err.parts().1, "CONCURRENCY_CONFLICT");
    }

    #[test]
    fn test_into_response_status() {
        let resp = AppError::Unauthorized("no key".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
