//! Device service (§4.7) — the orchestration core.
//!
//! Every provider-touching call runs the same pipeline: resolve account,
//! check ownership, check the rate limit, decrypt the token, construct the
//! provider client, invoke the capability, invalidate the cache on mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::account::{resolve_owned_account, Account, AccountProjection, AccountStore, Provider};
use crate::action::ValidatedAction;
use crate::coordinator::{Coordinator, RateLimitDecision};
use crate::device::Device;
use crate::error::AppError;
use crate::provider::{Ack, ProviderClient, ProviderError, Selector};

pub struct DeviceService {
    store: Arc<dyn AccountStore>,
    coordinator: Arc<dyn Coordinator>,
    /// One client instance per provider, built once at construction and
    /// reused across requests — connection pooling is delegated to the
    /// underlying HTTP library (§5), so this is never rebuilt per call.
    providers: HashMap<Provider, Arc<dyn ProviderClient>>,
    encryption_key: [u8; 32],
    device_cache_ttl: Duration,
    rate_limit_per_min: u32,
}

impl DeviceService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        coordinator: Arc<dyn Coordinator>,
        providers: HashMap<Provider, Arc<dyn ProviderClient>>,
        encryption_key: [u8; 32],
        device_cache_ttl: Duration,
        rate_limit_per_min: u32,
    ) -> Self {
        Self {
            store,
            coordinator,
            providers,
            encryption_key,
            device_cache_ttl,
            rate_limit_per_min,
        }
    }

    /// An unknown provider is a permanent internal error (§4.7 step 5) — it
    /// never exposes vendor identity details in the message.
    fn provider_client(&self, provider: Provider) -> Result<Arc<dyn ProviderClient>, AppError> {
        self.providers.get(&provider).cloned().ok_or_else(|| {
            tracing::error!(provider = %provider, "no client configured for provider");
            AppError::Internal
        })
    }

    /// Step 1–2 of the pipeline (§4.7): resolve the account and enforce
    /// ownership. Split out from [`Self::enter_pipeline`] so a cache hit can
    /// stop here without touching the rate limit or the encrypted token.
    async fn resolve_account(&self, caller: Uuid, account_id: Uuid) -> Result<Account, AppError> {
        resolve_owned_account(self.store.as_ref(), account_id, caller).await
    }

    /// Steps 3–5 of the pipeline (§4.7): check the rate limit, decrypt the
    /// token, construct the client. Only runs once ownership is resolved and
    /// only when a call is actually going to reach the provider.
    async fn enter_pipeline(
        &self,
        account: &Account,
    ) -> Result<(String, Arc<dyn ProviderClient>), AppError> {
        match self
            .coordinator
            .check_rate_limit(account.id, self.rate_limit_per_min)
            .await?
        {
            RateLimitDecision::Allowed => {}
            RateLimitDecision::Denied => return Err(AppError::RateLimited),
        }

        let token =
            crate::crypto::open(&self.encryption_key, &account.encrypted_token).map_err(AppError::from)?;
        let token = String::from_utf8(token).map_err(|_| AppError::Internal)?;

        let client = self.provider_client(account.provider)?;

        Ok((token, client))
    }

    /// Readiness probe: the account store round-trip (§6 `GET /ready`).
    pub async fn ping_store(&self) -> Result<(), AppError> {
        self.store.ping().await?;
        Ok(())
    }

    /// Readiness probe: the coordinator round-trip (§6 `GET /ready`).
    pub async fn ping_coordinator(&self) -> Result<(), AppError> {
        self.coordinator.ping().await?;
        Ok(())
    }

    /// Connects a new third-party account: validates the bearer token against
    /// the vendor, seals it, and persists the result (§4.6, §6 `POST
    /// /providers/connect`). Not part of the provider-touching pipeline in
    /// §4.7 — there is no existing account to resolve or rate-limit yet.
    pub async fn connect_account(
        &self,
        caller: Uuid,
        provider: Provider,
        token: &str,
    ) -> Result<AccountProjection, AppError> {
        let client = self.provider_client(provider)?;
        let info = client.validate_token(token).await?;

        let encrypted_token = crate::crypto::seal(&self.encryption_key, token.as_bytes())?;

        let account = self
            .store
            .create(
                caller,
                provider,
                info.provider_account_id,
                encrypted_token,
                info.metadata,
            )
            .await?;

        Ok(AccountProjection::from(&account))
    }

    /// Lists the caller's connected accounts (§6 `GET /accounts`).
    pub async fn list_accounts(&self, caller: Uuid) -> Result<Vec<AccountProjection>, AppError> {
        let accounts = self.store.find_by_owner(caller).await?;
        Ok(accounts.iter().map(AccountProjection::from).collect())
    }

    /// Disconnects an account, enforcing ownership at the store boundary so
    /// a mismatched owner and a missing id are indistinguishable (§4.6).
    pub async fn delete_account(&self, caller: Uuid, account_id: Uuid) -> Result<(), AppError> {
        self.store.delete(account_id, caller).await?;
        self.coordinator.delete_devices(account_id).await;
        Ok(())
    }

    /// Fan out over the caller's accounts; a per-account failure is logged
    /// and that account's devices are omitted, not surfaced (§4.7.1).
    pub async fn list_devices(&self, caller: Uuid) -> Result<Vec<Device>, AppError> {
        let accounts = self.store.find_by_owner(caller).await?;

        let mut all_devices = Vec::new();
        for account in accounts {
            match self.devices_for_account(caller, account.id).await {
                Ok(devices) => all_devices.extend(devices),
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "skipping account in list_devices");
                }
            }
        }
        Ok(all_devices)
    }

    /// Same pipeline as `list_devices`, scoped to one account, but errors
    /// propagate rather than being swallowed (§4.7.2).
    pub async fn list_account_devices(
        &self,
        caller: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<Device>, AppError> {
        self.devices_for_account(caller, account_id).await
    }

    async fn devices_for_account(
        &self,
        caller: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<Device>, AppError> {
        // Ownership is always enforced, but a cache hit never touches the
        // rate limit or the token — the limiter guards the provider, not the
        // cache (§4.8).
        let account = self.resolve_account(caller, account_id).await?;

        if let Some(cached) = self.coordinator.get_devices(account.id).await {
            return Ok(cached);
        }

        let (token, client) = self.enter_pipeline(&account).await?;
        let devices = self.fetch_and_tag(&client, &token, account.id).await?;
        self.coordinator
            .set_devices(account.id, &devices, self.device_cache_ttl)
            .await;
        Ok(devices)
    }

    async fn fetch_and_tag(
        &self,
        client: &Arc<dyn ProviderClient>,
        token: &str,
        account_id: Uuid,
    ) -> Result<Vec<Device>, ProviderError> {
        let mut devices = client.list_devices(token).await?;
        for d in &mut devices {
            d.account_id = account_id;
        }
        Ok(devices)
    }

    /// Bypasses the cache; always calls the provider, preserving freshness
    /// for a drill-down (§4.7.3). Still counts against the rate limit.
    pub async fn get_device(
        &self,
        caller: Uuid,
        account_id: Uuid,
        device_id: &str,
    ) -> Result<Device, AppError> {
        let account = self.resolve_account(caller, account_id).await?;
        let (token, client) = self.enter_pipeline(&account).await?;
        let mut device = client.get_device(&token, device_id).await?;
        device.account_id = account.id;
        Ok(device)
    }

    /// Validates the action, runs the pipeline for a mutating call, then
    /// invalidates the account's cache entry on success (§4.7.4). Cache
    /// invalidation is best-effort; a delete failure is logged by the
    /// coordinator, never surfaced here.
    pub async fn execute_action(
        &self,
        caller: Uuid,
        account_id: Uuid,
        selector: &Selector,
        action: &ValidatedAction,
    ) -> Result<Ack, AppError> {
        let account = self.resolve_account(caller, account_id).await?;
        let (token, client) = self.enter_pipeline(&account).await?;

        let ack = dispatch_action(client.as_ref(), &token, selector, action).await?;

        self.coordinator.delete_devices(account.id).await;

        Ok(ack)
    }

    /// Explicitly invalidates the cache, then performs a provider fetch and
    /// re-seeds it (§4.7.5).
    pub async fn refresh_devices(
        &self,
        caller: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<Device>, AppError> {
        let account = self.resolve_account(caller, account_id).await?;
        let (token, client) = self.enter_pipeline(&account).await?;

        self.coordinator.delete_devices(account.id).await;

        let devices = self.fetch_and_tag(&client, &token, account.id).await?;
        self.coordinator
            .set_devices(account.id, &devices, self.device_cache_ttl)
            .await;
        Ok(devices)
    }
}

async fn dispatch_action(
    client: &dyn ProviderClient,
    token: &str,
    selector: &Selector,
    action: &ValidatedAction,
) -> Result<Ack, ProviderError> {
    match action {
        ValidatedAction::Power { state, duration } => {
            let on = matches!(state, crate::action::PowerState::On);
            client.set_power(token, selector, on, *duration).await
        }
        ValidatedAction::Brightness { level, duration } => {
            client
                .set_brightness(token, selector, *level, *duration)
                .await
        }
        ValidatedAction::Color { color, duration } => {
            client.set_color(token, selector, *color, *duration).await
        }
        ValidatedAction::Temperature { kelvin, duration } => {
            client
                .set_color_temperature(token, selector, *kelvin, *duration)
                .await
        }
        ValidatedAction::Effect {
            name,
            color,
            cycles,
            period,
        } => match name {
            crate::action::EffectName::Pulse => {
                client
                    .pulse(token, selector, *color, *cycles, *period)
                    .await
            }
            crate::action::EffectName::Breathe => {
                client
                    .breathe(token, selector, *color, *cycles, *period)
                    .await
            }
        },
    }
}
