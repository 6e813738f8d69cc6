//! Shared application state threaded through axum handlers via
//! [`axum::extract::State`].

use std::sync::Arc;

use crate::config::AppConfig;
use crate::service::DeviceService;

/// Small `Clone` bundle of `Arc` handles — the only process-wide state
/// beyond the read-only key material is the store/coordinator/HTTP client
/// handles themselves, all thread-safe (§9).
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DeviceService>,
    pub config: AppConfig,
}
