//! Provider-client capability (§4.3).
//!
//! Providers are polymorphic over a fixed capability set rather than an open
//! class hierarchy (§9): new vendors are added by implementing
//! [`ProviderClient`], and the core dispatches on the `provider` tag stored
//! on the [`crate::account::Account`] row.

pub mod lifx;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::device::{Color, Device};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider rejected the bearer token")]
    InvalidToken,
    #[error("device or account not found upstream")]
    NotFound,
    #[error("selector matched no devices")]
    SelectorNotFound,
    #[error("upstream rate limit exceeded")]
    UpstreamRateLimited,
    #[error("operation not supported by this provider")]
    NotSupported,
    #[error("upstream provider error: {0}")]
    UpstreamError(String),
    #[error("transport error contacting provider: {0}")]
    Transport(String),
}

/// Information returned by a successful [`ProviderClient::validate_token`].
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub provider_account_id: String,
    pub label: String,
    pub metadata: HashMap<String, Value>,
}

/// Acknowledgement of a mutating call. `metadata` carries vendor-specific
/// passthrough, e.g. per-device status strings from a 207 multi-status.
#[derive(Debug, Clone, Default)]
pub struct Ack {
    pub metadata: HashMap<String, Value>,
}

/// A target selector within one account: `all`, `id:<id>`, `group_id:<id>`,
/// or `location_id:<id>` (§4.3). Implementations must accept `id:` at
/// minimum; `group_id:`/`location_id:` may return [`ProviderError::NotSupported`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    Id(String),
    GroupId(String),
    LocationId(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Self {
        if raw == "all" {
            return Selector::All;
        }
        if let Some(id) = raw.strip_prefix("id:") {
            return Selector::Id(id.to_string());
        }
        if let Some(id) = raw.strip_prefix("group_id:") {
            return Selector::GroupId(id.to_string());
        }
        if let Some(id) = raw.strip_prefix("location_id:") {
            return Selector::LocationId(id.to_string());
        }
        // Unrecognized grammar is treated as an opaque `id:` target rather
        // than rejected outright; the vendor will 404 if it's wrong.
        Selector::Id(raw.to_string())
    }

    /// Render back to the vendor's selector string grammar.
    pub fn to_wire(&self) -> String {
        match self {
            Selector::All => "all".to_string(),
            Selector::Id(id) => format!("id:{id}"),
            Selector::GroupId(id) => format!("group_id:{id}"),
            Selector::LocationId(id) => format!("location_id:{id}"),
        }
    }
}

/// The fixed capability set every provider adapter implements (§4.3).
///
/// Implementations must not retain per-call state beyond the HTTP client:
/// no caching, no session tokens cached between invocations.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn validate_token(&self, token: &str) -> Result<AccountInfo, ProviderError>;

    async fn list_devices(&self, token: &str) -> Result<Vec<Device>, ProviderError>;

    async fn get_device(&self, token: &str, id: &str) -> Result<Device, ProviderError>;

    async fn set_power(
        &self,
        token: &str,
        selector: &Selector,
        on: bool,
        duration_s: f64,
    ) -> Result<Ack, ProviderError>;

    async fn set_brightness(
        &self,
        token: &str,
        selector: &Selector,
        level: f64,
        duration_s: f64,
    ) -> Result<Ack, ProviderError>;

    async fn set_color(
        &self,
        token: &str,
        selector: &Selector,
        color: Color,
        duration_s: f64,
    ) -> Result<Ack, ProviderError>;

    async fn set_color_temperature(
        &self,
        token: &str,
        selector: &Selector,
        kelvin: u32,
        duration_s: f64,
    ) -> Result<Ack, ProviderError>;

    async fn pulse(
        &self,
        token: &str,
        selector: &Selector,
        color: Option<Color>,
        cycles: u32,
        period_s: f64,
    ) -> Result<Ack, ProviderError>;

    async fn breathe(
        &self,
        token: &str,
        selector: &Selector,
        color: Option<Color>,
        cycles: u32,
        period_s: f64,
    ) -> Result<Ack, ProviderError>;
}
