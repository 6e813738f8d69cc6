//! Crate-wide error taxonomy and its single HTTP status mapping.
//!
//! Every layer below returns its own narrow `thiserror` enum; [`AppError`] is
//! the one place those get folded into the status codes clients see (§4.9).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::coordinator::CoordinatorError;
use crate::crypto::CryptoError;
use crate::provider::ProviderError;
use crate::account::StoreError;
use crate::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid request")]
    InvalidRequest,

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("account already exists")]
    Conflict,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("invalid provider token")]
    InvalidProviderToken,

    #[error("upstream provider unavailable")]
    UpstreamUnavailable,

    #[error("service temporarily unavailable")]
    Unavailable,

    #[error("internal error")]
    Internal,
}

impl From<ValidationError> for AppError {
    fn from(_: ValidationError) -> Self {
        AppError::InvalidRequest
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::AlreadyExists => AppError::Conflict,
            StoreError::Backend(e) => {
                tracing::error!(error = %e, "account store backend error");
                AppError::Internal
            }
        }
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        tracing::error!(error = %err, "crypto layer error");
        AppError::Internal
    }
}

impl From<CoordinatorError> for AppError {
    fn from(err: CoordinatorError) -> Self {
        tracing::warn!(error = %err, "coordinator unavailable");
        AppError::Unavailable
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidToken => AppError::InvalidProviderToken,
            ProviderError::NotFound | ProviderError::SelectorNotFound => AppError::NotFound,
            ProviderError::UpstreamRateLimited => AppError::RateLimited,
            ProviderError::NotSupported => AppError::InvalidRequest,
            ProviderError::UpstreamError(msg) | ProviderError::Transport(msg) => {
                tracing::warn!(error = %msg, "upstream provider error");
                AppError::UpstreamUnavailable
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::InvalidRequest => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::InvalidProviderToken => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamUnavailable | AppError::Unavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
