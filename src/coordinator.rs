//! Cache & rate-limit coordinator (§4.8).
//!
//! Backs both the per-account device cache and the per-account sliding
//! rate-limit counter through one external store, so a fleet of replicas
//! sees a single cache and a single limit per account.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::device::Device;

const RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator backend error: {0}")]
    Backend(String),
}

fn cache_key(account_id: Uuid) -> String {
    format!("devices:account:{account_id}")
}

fn rate_limit_key(account_id: Uuid) -> String {
    format!("ratelimit:account:{account_id}")
}

/// Outcome of a rate-limit check: whether the call is allowed, given the
/// configured per-minute cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Denied,
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Advisory cache read. A backend failure degrades to a miss (`Ok(None)`)
    /// rather than propagating — callers fall through to the provider.
    async fn get_devices(&self, account_id: Uuid) -> Option<Vec<Device>>;

    /// Best-effort cache write; TTL of zero disables caching entirely.
    async fn set_devices(&self, account_id: Uuid, devices: &[Device], ttl: Duration);

    /// Best-effort invalidation; failures are logged by the caller, never
    /// surfaced (§4.7 step 7, §7).
    async fn delete_devices(&self, account_id: Uuid);

    /// Atomically increments the account's rate-limit counter and reports
    /// whether the call is within budget. Unlike cache operations, a
    /// backend failure here must propagate as [`CoordinatorError`] — denying
    /// access when the limiter is untrusted preserves the upstream's budget
    /// (§4.8, §7).
    async fn check_rate_limit(
        &self,
        account_id: Uuid,
        limit_per_min: u32,
    ) -> Result<RateLimitDecision, CoordinatorError>;

    /// Readiness probe — a cheap round-trip confirming the backend is
    /// reachable (§6 `GET /ready`).
    async fn ping(&self) -> Result<(), CoordinatorError>;
}

/// Redis-backed coordinator using an async multiplexed connection.
pub struct RedisCoordinator {
    client: redis::Client,
}

impl RedisCoordinator {
    pub fn new(redis_url: &str) -> Result<Self, CoordinatorError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| CoordinatorError::Backend(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, CoordinatorError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoordinatorError::Backend(e.to_string()))
    }
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn get_devices(&self, account_id: Uuid) -> Option<Vec<Device>> {
        let mut conn = match self.connection().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "cache read: coordinator unreachable, treating as miss");
                return None;
            }
        };
        let raw: Option<Vec<u8>> = conn.get(cache_key(account_id)).await.ok()?;
        let raw = raw?;
        match serde_json::from_slice(&raw) {
            Ok(devices) => Some(devices),
            Err(e) => {
                tracing::warn!(error = %e, "cache read: corrupt entry, treating as miss");
                None
            }
        }
    }

    async fn set_devices(&self, account_id: Uuid, devices: &[Device], ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let mut conn = match self.connection().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "cache write: coordinator unreachable, swallowing");
                return;
            }
        };
        let Ok(encoded) = serde_json::to_vec(devices) else {
            tracing::warn!("cache write: failed to encode device list, swallowing");
            return;
        };
        let result: redis::RedisResult<()> = conn
            .set_ex(cache_key(account_id), encoded, ttl.as_secs().max(1))
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "cache write failed, swallowing");
        }
    }

    async fn delete_devices(&self, account_id: Uuid) {
        let mut conn = match self.connection().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "cache invalidation: coordinator unreachable, swallowing");
                return;
            }
        };
        let result: redis::RedisResult<()> = conn.del(cache_key(account_id)).await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "cache invalidation failed, swallowing");
        }
    }

    async fn check_rate_limit(
        &self,
        account_id: Uuid,
        limit_per_min: u32,
    ) -> Result<RateLimitDecision, CoordinatorError> {
        let mut conn = self.connection().await?;
        let key = rate_limit_key(account_id);

        let count: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| CoordinatorError::Backend(e.to_string()))?;

        // First increment in the window establishes the TTL. Re-assert it
        // whenever the counter is 1 to cover the rare race where the
        // increment succeeded but a prior process crashed before setting
        // the expiry (§5).
        if count == 1 {
            let _: redis::RedisResult<()> =
                conn.expire(&key, RATE_LIMIT_WINDOW_SECS as i64).await;
        }

        if count as u32 > limit_per_min {
            Ok(RateLimitDecision::Denied)
        } else {
            Ok(RateLimitDecision::Allowed)
        }
    }

    async fn ping(&self) -> Result<(), CoordinatorError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CoordinatorError::Backend(e.to_string()))?;
        Ok(())
    }
}

struct InMemoryCacheEntry {
    devices: Vec<Device>,
    expires_at: Instant,
}

struct InMemoryCounter {
    count: u32,
    window_started: Instant,
}

/// In-memory coordinator — backs tests and single-replica deployments that
/// opt out of Redis (§4.8).
#[derive(Default)]
pub struct InMemoryCoordinator {
    cache: Mutex<HashMap<Uuid, InMemoryCacheEntry>>,
    counters: Mutex<HashMap<Uuid, InMemoryCounter>>,
}

#[async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn get_devices(&self, account_id: Uuid) -> Option<Vec<Device>> {
        let cache = self.cache.lock().unwrap();
        let entry = cache.get(&account_id)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.devices.clone())
    }

    async fn set_devices(&self, account_id: Uuid, devices: &[Device], ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.lock().unwrap();
        cache.insert(
            account_id,
            InMemoryCacheEntry {
                devices: devices.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete_devices(&self, account_id: Uuid) {
        let mut cache = self.cache.lock().unwrap();
        cache.remove(&account_id);
    }

    async fn check_rate_limit(
        &self,
        account_id: Uuid,
        limit_per_min: u32,
    ) -> Result<RateLimitDecision, CoordinatorError> {
        let mut counters = self.counters.lock().unwrap();
        let now = Instant::now();
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);

        let counter = counters.entry(account_id).or_insert(InMemoryCounter {
            count: 0,
            window_started: now,
        });

        if now.duration_since(counter.window_started) >= window {
            counter.count = 0;
            counter.window_started = now;
        }

        counter.count += 1;

        if counter.count > limit_per_min {
            Ok(RateLimitDecision::Denied)
        } else {
            Ok(RateLimitDecision::Allowed)
        }
    }

    async fn ping(&self) -> Result<(), CoordinatorError> {
        Ok(())
    }
}
