//! Caller-identity and request-body extraction (§4.9).
//!
//! `CallerIdentity` stands in for the upstream `AuthService`: real
//! session/JWT verification happens before a request reaches this crate. It
//! only reads the already-validated `Bearer <user_id>` header and rejects
//! otherwise.

use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, as established upstream.
pub struct CallerIdentity(pub Uuid);

impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let raw = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;
        let user_id = Uuid::parse_str(raw).map_err(|_| AppError::Unauthorized)?;
        Ok(CallerIdentity(user_id))
    }
}

/// JSON body extractor whose rejections route through [`AppError`] instead
/// of axum's default `JsonRejection` (which answers 422) — malformed or
/// wrong-shaped bodies must come back as 400 (§4.9).
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|_| AppError::InvalidRequest)?;
        Ok(ValidatedJson(value))
    }
}
