//! Relay error type and its HTTP representation.
//!
//! Every failure surfaced to a caller collapses to a single JSON body,
//! `{"error": "<message>"}`, at the appropriate status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Relay-wide error type returned by the controller, auth, and store layers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::Forbidden(_) => StatusCode::FORBIDDEN,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Conflict(_) => StatusCode::CONFLICT,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message placed in the response body. Internal errors never leak
    /// their detail to the caller; the full error is still logged by the
    /// tracing middleware.
    fn public_message(&self) -> String {
        match self {
            RelayError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if matches!(self, RelayError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status();
        let body = ErrorBody {
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

impl From<StoreError> for RelayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => RelayError::NotFound(msg),
            StoreError::AlreadyExists(msg) => RelayError::Conflict(msg),
            StoreError::Backend(msg) => RelayError::Internal(msg),
            StoreError::Encoding(msg) => RelayError::Internal(msg),
        }
    }
}

impl From<AuthError> for RelayError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::UnknownUser(msg) => RelayError::NotFound(msg),
            AuthError::InvalidSignature
            | AuthError::ChallengeExpired
            | AuthError::TokenExpired
            | AuthError::InvalidToken(_) => RelayError::Unauthorized(e.to_string()),
            AuthError::InvalidPublicKey(msg) => RelayError::BadRequest(msg),
            AuthError::Store(inner) => RelayError::from(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn not_found_maps_to_404_with_error_body() {
        let response = RelayError::NotFound("no such user".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "no such user");
    }

    #[tokio::test]
    async fn internal_error_hides_detail_from_caller() {
        let response = RelayError::Internal("rocksdb corrupt".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "internal server error");
    }
}
