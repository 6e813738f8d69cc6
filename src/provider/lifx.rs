//! LIFX provider adapter.
//!
//! Talks HTTPS to the LIFX cloud API with a per-request `Bearer` header.
//! Response codes are interpreted per §4.3: 200/207 → success, 401 →
//! `InvalidToken`, 404 → `NotFound`/`SelectorNotFound`, 429 →
//! `UpstreamRateLimited`, 5xx → `UpstreamError`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::device::{Capability, Color, Device, GroupRef, LocationRef, Power};
use crate::provider::{AccountInfo, Ack, ProviderClient, ProviderError, Selector};

const DEFAULT_BASE_URL: &str = "https://api.lifx.com";

/// LIFX adapter. Holds nothing but an HTTP client and base URL between
/// calls — no per-call state is retained (§4.3).
#[derive(Clone)]
pub struct LifxClient {
    http: reqwest::Client,
    base_url: String,
}

impl LifxClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(timeout, DEFAULT_BASE_URL.to_string())
    }

    /// Construct against a non-default base URL — used in tests to point at
    /// a local mock server.
    pub fn with_base_url(timeout: Duration, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { http, base_url }
    }
}

#[derive(Debug, Deserialize)]
struct LifxLight {
    id: String,
    label: String,
    connected: bool,
    power: String,
    brightness: f64,
    color: Option<LifxColor>,
    group: Option<LifxGroup>,
    location: Option<LifxLocation>,
    product: Option<LifxProduct>,
}

#[derive(Debug, Deserialize)]
struct LifxColor {
    hue: f64,
    saturation: f64,
    kelvin: u32,
}

#[derive(Debug, Deserialize)]
struct LifxGroup {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LifxLocation {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct LifxProduct {
    capabilities: LifxCapabilities,
}

#[derive(Debug, Deserialize)]
struct LifxCapabilities {
    #[serde(default)]
    has_color: bool,
}

#[derive(Debug, Deserialize)]
struct LifxStateChangeResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LifxStateChangeResponse {
    #[serde(default)]
    results: Vec<LifxStateChangeResult>,
}

fn to_neutral_device(light: LifxLight, account_id: uuid::Uuid) -> Device {
    let mut capabilities = vec![
        Capability::Brightness,
        Capability::Temperature,
        Capability::Effects,
    ];
    if light
        .product
        .as_ref()
        .map(|p| p.capabilities.has_color)
        .unwrap_or(false)
    {
        capabilities.push(Capability::Color);
    }

    Device {
        id: light.id,
        account_id,
        provider: "lifx".to_string(),
        label: light.label,
        power: if light.power == "on" {
            Power::On
        } else {
            Power::Off
        },
        brightness: light.brightness,
        color: light.color.map(|c| Color {
            hue: c.hue,
            saturation: c.saturation,
            kelvin: c.kelvin,
        }),
        connected: light.connected,
        reachable: light.connected,
        group: light.group.map(|g| GroupRef {
            id: g.id,
            name: g.name,
        }),
        location: light.location.map(|l| LocationRef {
            id: l.id,
            name: l.name,
        }),
        capabilities,
        metadata: HashMap::new(),
    }
}

fn color_to_wire(color: Color) -> String {
    format!(
        "hue:{} saturation:{} kelvin:{}",
        color.hue, color.saturation, color.kelvin
    )
}

fn map_status(status: StatusCode, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::InvalidToken,
        StatusCode::NOT_FOUND => ProviderError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => ProviderError::UpstreamRateLimited,
        _ => ProviderError::UpstreamError(format!("{status}: {body}")),
    }
}

fn ack_from_results(results: Vec<LifxStateChangeResult>) -> Ack {
    let mut metadata = HashMap::new();
    if !results.is_empty() {
        let statuses: Vec<Value> = results
            .into_iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "status": r.status,
                })
            })
            .collect();
        metadata.insert("results".to_string(), Value::Array(statuses));
    }
    Ack { metadata }
}

impl LifxClient {
    async fn get_all_lights(&self, token: &str) -> Result<Vec<LifxLight>, ProviderError> {
        let url = format!("{}/v1/lights/all", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            resp.json::<Vec<LifxLight>>()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(map_status(status, &body))
        }
    }

    async fn put_state(
        &self,
        token: &str,
        selector: &Selector,
        body: Value,
    ) -> Result<Ack, ProviderError> {
        if matches!(selector, Selector::GroupId(_) | Selector::LocationId(_)) {
            return Err(ProviderError::NotSupported);
        }

        let url = format!("{}/v1/lights/{}/state", self.base_url, selector.to_wire());
        let resp = self
            .http
            .put(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            // 200 and 207 both indicate success; preserve per-device status.
            let parsed: LifxStateChangeResponse = resp.json().await.unwrap_or_default();
            Ok(ack_from_results(parsed.results))
        } else if status == StatusCode::NOT_FOUND {
            Err(ProviderError::SelectorNotFound)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(map_status(status, &body))
        }
    }

    async fn post_effect(
        &self,
        token: &str,
        selector: &Selector,
        effect: &str,
        body: Value,
    ) -> Result<Ack, ProviderError> {
        if matches!(selector, Selector::GroupId(_) | Selector::LocationId(_)) {
            return Err(ProviderError::NotSupported);
        }

        let url = format!(
            "{}/v1/lights/{}/effects/{}",
            self.base_url,
            selector.to_wire(),
            effect
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let parsed: LifxStateChangeResponse = resp.json().await.unwrap_or_default();
            Ok(ack_from_results(parsed.results))
        } else if status == StatusCode::NOT_FOUND {
            Err(ProviderError::SelectorNotFound)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(map_status(status, &body))
        }
    }
}

#[async_trait]
impl ProviderClient for LifxClient {
    async fn validate_token(&self, token: &str) -> Result<AccountInfo, ProviderError> {
        let lights = self.get_all_lights(token).await?;

        let provider_account_id = lights
            .first()
            .and_then(|l| l.location.as_ref())
            .map(|loc| loc.id.clone())
            .unwrap_or_else(|| "lifx-account".to_string());

        let label = lights
            .first()
            .and_then(|l| l.location.as_ref())
            .map(|loc| loc.name.clone())
            .unwrap_or_else(|| "LIFX account".to_string());

        let mut metadata = HashMap::new();
        metadata.insert("lights_count".to_string(), Value::from(lights.len()));

        Ok(AccountInfo {
            provider_account_id,
            label,
            metadata,
        })
    }

    async fn list_devices(&self, token: &str) -> Result<Vec<Device>, ProviderError> {
        let lights = self.get_all_lights(token).await?;
        // account_id is filled in by the caller (the device service), which
        // knows which Account this client instance is serving.
        Ok(lights
            .into_iter()
            .map(|l| to_neutral_device(l, uuid::Uuid::nil()))
            .collect())
    }

    async fn get_device(&self, token: &str, id: &str) -> Result<Device, ProviderError> {
        let url = format!("{}/v1/lights/id:{}", self.base_url, id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let lights: Vec<LifxLight> = resp
                .json()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;
            lights
                .into_iter()
                .next()
                .map(|l| to_neutral_device(l, uuid::Uuid::nil()))
                .ok_or(ProviderError::NotFound)
        } else if status == StatusCode::NOT_FOUND {
            Err(ProviderError::NotFound)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(map_status(status, &body))
        }
    }

    async fn set_power(
        &self,
        token: &str,
        selector: &Selector,
        on: bool,
        duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        let body = serde_json::json!({
            "power": if on { "on" } else { "off" },
            "duration": duration_s,
        });
        self.put_state(token, selector, body).await
    }

    async fn set_brightness(
        &self,
        token: &str,
        selector: &Selector,
        level: f64,
        duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        let body = serde_json::json!({
            "brightness": level,
            "duration": duration_s,
        });
        self.put_state(token, selector, body).await
    }

    async fn set_color(
        &self,
        token: &str,
        selector: &Selector,
        color: Color,
        duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        let body = serde_json::json!({
            "color": color_to_wire(color),
            "duration": duration_s,
        });
        self.put_state(token, selector, body).await
    }

    async fn set_color_temperature(
        &self,
        token: &str,
        selector: &Selector,
        kelvin: u32,
        duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        let body = serde_json::json!({
            "color": format!("kelvin:{kelvin}"),
            "duration": duration_s,
        });
        self.put_state(token, selector, body).await
    }

    async fn pulse(
        &self,
        token: &str,
        selector: &Selector,
        color: Option<Color>,
        cycles: u32,
        period_s: f64,
    ) -> Result<Ack, ProviderError> {
        let mut body = serde_json::json!({
            "cycles": cycles,
            "period": period_s,
        });
        if let Some(c) = color {
            body["color"] = Value::String(color_to_wire(c));
        }
        self.post_effect(token, selector, "pulse", body).await
    }

    async fn breathe(
        &self,
        token: &str,
        selector: &Selector,
        color: Option<Color>,
        cycles: u32,
        period_s: f64,
    ) -> Result<Ack, ProviderError> {
        let mut body = serde_json::json!({
            "cycles": cycles,
            "period": period_s,
        });
        if let Some(c) = color {
            body["color"] = Value::String(color_to_wire(c));
        }
        self.post_effect(token, selector, "breathe", body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_wire_format_matches_grammar() {
        let c = Color {
            hue: 120.0,
            saturation: 0.5,
            kelvin: 3500,
        };
        assert_eq!(color_to_wire(c), "hue:120 saturation:0.5 kelvin:3500");
    }

    #[test]
    fn capability_tagging_adds_color_only_when_supported() {
        let light = LifxLight {
            id: "d1".into(),
            label: "Lamp".into(),
            connected: true,
            power: "on".into(),
            brightness: 1.0,
            color: None,
            group: None,
            location: None,
            product: Some(LifxProduct {
                capabilities: LifxCapabilities { has_color: true },
            }),
        };
        let device = to_neutral_device(light, uuid::Uuid::nil());
        assert!(device.has_capability(Capability::Color));
        assert!(device.has_capability(Capability::Brightness));
    }

    #[test]
    fn capability_tagging_omits_color_when_unsupported() {
        let light = LifxLight {
            id: "d1".into(),
            label: "Lamp".into(),
            connected: true,
            power: "off".into(),
            brightness: 0.0,
            color: None,
            group: None,
            location: None,
            product: None,
        };
        let device = to_neutral_device(light, uuid::Uuid::nil());
        assert!(!device.has_capability(Capability::Color));
    }
}
