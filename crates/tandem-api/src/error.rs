use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use tandem_db::StoreError;
use tandem_stream::ProviderError;

/// Everything a handler can fail with. Each variant maps to exactly one
/// HTTP status; nothing escapes to the transport layer unclassified.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Unauthorized(String),

    /// Provider failure on a critical path (token issuance).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            // Conflicts surface as 400s; clients treat them as
            // validation failures.
            ApiError::Store(StoreError::Invalid(msg)) | ApiError::Store(StoreError::Conflict(msg)) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Store(StoreError::Forbidden(msg)) => (StatusCode::FORBIDDEN, msg),
            ApiError::Store(StoreError::NotFound(msg)) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Store(StoreError::Internal(detail)) | ApiError::Internal(detail) => {
                internal(detail)
            }
            ApiError::Store(StoreError::Db(e)) => internal(e.to_string()),
            ApiError::Provider(e) => internal(e.to_string()),
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

/// 500s always log the detail; the response body carries it only outside
/// production.
fn internal(detail: String) -> (StatusCode, String) {
    error!("Internal error: {}", detail);
    let production = std::env::var("TANDEM_ENV").as_deref() == Ok("production");
    let message = if production {
        "Internal Server Error".to_string()
    } else {
        detail
    };
    (StatusCode::INTERNAL_SERVER_ERROR, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn store_errors_map_to_http_statuses() {
        assert_eq!(
            status_of(StoreError::invalid("bad").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(StoreError::conflict("dup").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(StoreError::forbidden("no").into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(StoreError::not_found("gone").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::unauthorized("who")),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ApiError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
