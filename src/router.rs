//! Route table (§4.9, §6), separated from [`crate::main`] so integration
//! tests can mount it directly against an in-memory [`AppState`].

use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/providers/connect", post(handlers::connect_provider))
        .route("/accounts", get(handlers::list_accounts))
        .route("/accounts/{id}", delete(handlers::delete_account))
        .route("/devices", get(handlers::list_devices))
        .route(
            "/accounts/{accountId}/devices",
            get(handlers::list_account_devices),
        )
        .route(
            "/accounts/{accountId}/devices/refresh",
            post(handlers::refresh_devices),
        )
        .route(
            "/accounts/{accountId}/devices/{deviceId}",
            get(handlers::get_device),
        )
        .route(
            "/accounts/{accountId}/devices/{selector}/action",
            post(handlers::execute_action),
        )
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
