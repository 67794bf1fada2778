#[cfg(test)]
mod tests;

use axum::extract::rejection::JsonRejection;
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::RagError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::InvalidQuery(_) => ApiError::BadRequest(message),
            RagError::IngestionInProgress => ApiError::Conflict(message),
            RagError::Generation(_) | RagError::Feed(_) | RagError::Embedding(_) => {
                ApiError::BadGateway(message)
            }
            RagError::Retrieval(_) | RagError::IndexUnavailable(_) => {
                ApiError::ServiceUnavailable(message)
            }
            _ => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => msg,
        };
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, message);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
