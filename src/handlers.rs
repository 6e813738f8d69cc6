//! HTTP handlers (§4.9, §6) — thin bindings over [`crate::service::DeviceService`].
//!
//! Each handler parses its inputs, calls the service, and lets [`AppError`]'s
//! `IntoResponse` impl do the status-code mapping; no handler decides a
//! status code itself.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::account::Provider;
use crate::action::ActionRequest;
use crate::error::AppError;
use crate::extract::{CallerIdentity, ValidatedJson};
use crate::provider::Selector;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub provider: Provider,
    pub token: String,
}

pub async fn connect_provider(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    ValidatedJson(body): ValidatedJson<ConnectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let projection = state
        .service
        .connect_account(caller, body.provider, &body.token)
        .await?;
    Ok((StatusCode::CREATED, Json(projection)))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<impl IntoResponse, AppError> {
    let accounts = state.service.list_accounts(caller).await?;
    Ok(Json(json!({ "accounts": accounts })))
}

pub async fn delete_account(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(account_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.service.delete_account(caller, account_id).await?;
    Ok(Json(json!({ "message": "account deleted" })))
}

pub async fn list_devices(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<impl IntoResponse, AppError> {
    let devices = state.service.list_devices(caller).await?;
    Ok(Json(json!({ "devices": devices })))
}

pub async fn list_account_devices(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(account_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let devices = state
        .service
        .list_account_devices(caller, account_id)
        .await?;
    Ok(Json(json!({ "devices": devices })))
}

pub async fn get_device(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((account_id, device_id)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let device = state
        .service
        .get_device(caller, account_id, &device_id)
        .await?;
    Ok(Json(device))
}

#[derive(Debug, Serialize)]
struct ActionResponse {
    success: bool,
    message: String,
}

pub async fn execute_action(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path((account_id, raw_selector)): Path<(Uuid, String)>,
    ValidatedJson(body): ValidatedJson<ActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let action = crate::action::validate(&body)?;
    let selector = Selector::parse(&raw_selector);

    state
        .service
        .execute_action(caller, account_id, &selector, &action)
        .await?;

    Ok(Json(ActionResponse {
        success: true,
        message: "action applied".to_string(),
    }))
}

pub async fn refresh_devices(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
    Path(account_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let devices = state.service.refresh_devices(caller, account_id).await?;
    Ok(Json(json!({ "devices": devices })))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.service.ping_store().await.is_ok();
    let coordinator_ok = state.service.ping_coordinator().await.is_ok();

    let status = if db_ok && coordinator_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db_ok && coordinator_ok { "ready" } else { "not_ready" },
            "db": db_ok,
            "coordinator": coordinator_ok,
        })),
    )
}
