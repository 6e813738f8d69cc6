//! Application configuration loaded from environment variables.
//!
//! Required: `ENCRYPTION_KEY`, `DATABASE_URL`, `REDIS_URL`
//! Optional: `DEVICE_CACHE_TTL_SECS`, `RATE_LIMIT_PER_MIN`, `UPSTREAM_TIMEOUT_SECS`,
//! `HTTP_PORT`, `SHUTDOWN_GRACE_SECS`

use anyhow::{Context, Result};
use std::time::Duration;

/// Application configuration for the lighting bridge backend.
///
/// Loaded once at startup via [`AppConfig::from_env`]. Cheap to clone — heavy
/// fields are small (`[u8; 32]` key material, strings); pool/client handles
/// live on [`crate::state::AppState`], not here.
#[derive(Clone)]
pub struct AppConfig {
    /// 32-byte AES-256-GCM data-encryption key, decoded from 64 hex chars.
    pub encryption_key: [u8; 32],
    /// Postgres connection string for the account store.
    pub database_url: String,
    /// Redis connection string for the cache/rate-limit coordinator.
    pub redis_url: String,
    /// Device list cache lifetime. Zero disables caching.
    pub device_cache_ttl: Duration,
    /// Per-account calls allowed per 60-second window.
    pub rate_limit_per_min: u32,
    /// Timeout applied to every outbound provider HTTP call.
    pub upstream_timeout: Duration,
    /// Port the HTTP server binds on.
    pub http_port: u16,
    /// Deadline for draining in-flight requests on shutdown.
    pub shutdown_grace: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns a descriptive error if any required variable is missing or
    /// invalid. Called once, before the server binds a socket — failure here
    /// must stop the process, never silently fall back to a weaker config.
    pub fn from_env() -> Result<Self> {
        let encryption_key = load_encryption_key()?;

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL env var must be set")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL env var must be set")?;

        let device_cache_ttl = env_u64("DEVICE_CACHE_TTL_SECS", 60)
            .map(Duration::from_secs)
            .context("invalid DEVICE_CACHE_TTL_SECS")?;
        let rate_limit_per_min: u32 = env_u64("RATE_LIMIT_PER_MIN", 30)
            .context("invalid RATE_LIMIT_PER_MIN")?
            .try_into()
            .context("RATE_LIMIT_PER_MIN out of range")?;
        let upstream_timeout = env_u64("UPSTREAM_TIMEOUT_SECS", 10)
            .map(Duration::from_secs)
            .context("invalid UPSTREAM_TIMEOUT_SECS")?;
        let http_port: u16 = env_u64("HTTP_PORT", 8080)
            .context("invalid HTTP_PORT")?
            .try_into()
            .context("HTTP_PORT out of range")?;
        let shutdown_grace = env_u64("SHUTDOWN_GRACE_SECS", 10)
            .map(Duration::from_secs)
            .context("invalid SHUTDOWN_GRACE_SECS")?;

        Ok(Self {
            encryption_key,
            database_url,
            redis_url,
            device_cache_ttl,
            rate_limit_per_min,
            upstream_timeout,
            http_port,
            shutdown_grace,
        })
    }
}

/// Read an optional env var as `u64`, falling back to `default` when unset.
fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(val) => val
            .parse::<u64>()
            .with_context(|| format!("{name} is not a valid integer: {val}")),
        Err(std::env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e).with_context(|| format!("failed to read {name}")),
    }
}

/// Decode the 32-byte data-encryption key from `ENCRYPTION_KEY` (64 hex chars).
///
/// Never logs the raw value, decoded or not.
fn load_encryption_key() -> Result<[u8; 32]> {
    let hex_key = std::env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY env var must be set")?;
    let bytes = hex::decode(hex_key.trim()).context("ENCRYPTION_KEY is not valid hex")?;
    let key: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        anyhow::anyhow!("ENCRYPTION_KEY must decode to 32 bytes, got {}", v.len())
    })?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for var in [
            "ENCRYPTION_KEY",
            "DATABASE_URL",
            "REDIS_URL",
            "DEVICE_CACHE_TTL_SECS",
            "RATE_LIMIT_PER_MIN",
            "UPSTREAM_TIMEOUT_SECS",
            "HTTP_PORT",
            "SHUTDOWN_GRACE_SECS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn rejects_short_key() {
        clear_env();
        std::env::set_var("ENCRYPTION_KEY", "abcd");
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("REDIS_URL", "redis://localhost");
        assert!(AppConfig::from_env().is_err());
    }

    #[test]
    fn accepts_64_hex_chars_and_applies_defaults() {
        clear_env();
        std::env::set_var("ENCRYPTION_KEY", "11".repeat(32));
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("REDIS_URL", "redis://localhost");
        let cfg = AppConfig::from_env().expect("should load");
        assert_eq!(cfg.rate_limit_per_min, 30);
        assert_eq!(cfg.device_cache_ttl, Duration::from_secs(60));
        assert_eq!(cfg.http_port, 8080);
    }
}
