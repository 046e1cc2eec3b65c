//! Error-to-HTTP mapping.
//!
//! Validation → 400 with `{field, message}`, not-found → 404, denial →
//! 403, store faults → 502, engine unavailability → 503. Cache and audit
//! failures never reach this layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mirador_core::CoreError;
use serde::Serialize;

/// Wire shape of an error payload.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Axum-compatible wrapper over the core error taxonomy.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl From<mirador_engines::EngineError> for ApiError {
    fn from(err: mirador_engines::EngineError) -> Self {
        ApiError(CoreError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, field, message) = match &self.0 {
            CoreError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                Some(field.clone()),
                message.clone(),
            ),
            CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, None, self.0.to_string()),
            CoreError::Denied(_) => (StatusCode::FORBIDDEN, None, self.0.to_string()),
            CoreError::Store(_) => (StatusCode::BAD_GATEWAY, None, self.0.to_string()),
            CoreError::EngineUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, None, self.0.to_string())
            }
            CoreError::Cache(_) | CoreError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, None, self.0.to_string())
            }
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: ErrorDetail { field, message },
            }),
        )
            .into_response()
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: CoreError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn taxonomy_mapping() {
        assert_eq!(
            status_of(CoreError::validation("name", "bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CoreError::not_found("metric", "cpu")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CoreError::Denied("nope".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CoreError::Store("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CoreError::EngineUnavailable("rca".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(CoreError::Cache("miss".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
