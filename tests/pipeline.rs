//! End-to-end pipeline scenarios (§8), exercised against the service layer
//! with in-memory test doubles — no database, no Redis, no real vendor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use lighting_bridge_backend::account::{AccountStore, InMemoryAccountStore, Provider};
use lighting_bridge_backend::action::{self, ActionParameters, ActionRequest};
use lighting_bridge_backend::coordinator::{Coordinator, InMemoryCoordinator, RateLimitDecision};
use lighting_bridge_backend::device::{Capability, Color, Device, Power};
use lighting_bridge_backend::error::AppError;
use lighting_bridge_backend::provider::{AccountInfo, Ack, ProviderClient, ProviderError, Selector};
use lighting_bridge_backend::service::DeviceService;

/// Stands in for a real vendor: an in-memory fleet of devices with a call
/// counter so tests can assert how many times upstream was actually hit.
struct MockProviderClient {
    devices: Mutex<Vec<Device>>,
    list_calls: AtomicUsize,
}

impl MockProviderClient {
    fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            list_calls: AtomicUsize::new(0),
        }
    }

    fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn validate_token(&self, token: &str) -> Result<AccountInfo, ProviderError> {
        if token.is_empty() {
            return Err(ProviderError::InvalidToken);
        }
        let mut metadata = HashMap::new();
        metadata.insert(
            "lights_count".to_string(),
            Value::from(self.devices.lock().unwrap().len()),
        );
        Ok(AccountInfo {
            provider_account_id: "loc-1".to_string(),
            label: "Test account".to_string(),
            metadata,
        })
    }

    async fn list_devices(&self, _token: &str) -> Result<Vec<Device>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn get_device(&self, _token: &str, id: &str) -> Result<Device, ProviderError> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn set_power(
        &self,
        _token: &str,
        selector: &Selector,
        on: bool,
        _duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        let mut devices = self.devices.lock().unwrap();
        match selector {
            Selector::Id(id) => {
                let device = devices
                    .iter_mut()
                    .find(|d| &d.id == id)
                    .ok_or(ProviderError::SelectorNotFound)?;
                device.power = if on { Power::On } else { Power::Off };
            }
            Selector::All => {
                for d in devices.iter_mut() {
                    d.power = if on { Power::On } else { Power::Off };
                }
            }
            Selector::GroupId(_) | Selector::LocationId(_) => {
                return Err(ProviderError::NotSupported)
            }
        }
        Ok(Ack::default())
    }

    async fn set_brightness(
        &self,
        _token: &str,
        _selector: &Selector,
        _level: f64,
        _duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        Ok(Ack::default())
    }

    async fn set_color(
        &self,
        _token: &str,
        _selector: &Selector,
        _color: Color,
        _duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        Ok(Ack::default())
    }

    async fn set_color_temperature(
        &self,
        _token: &str,
        _selector: &Selector,
        _kelvin: u32,
        _duration_s: f64,
    ) -> Result<Ack, ProviderError> {
        Ok(Ack::default())
    }

    async fn pulse(
        &self,
        _token: &str,
        _selector: &Selector,
        _color: Option<Color>,
        _cycles: u32,
        _period_s: f64,
    ) -> Result<Ack, ProviderError> {
        Ok(Ack::default())
    }

    async fn breathe(
        &self,
        _token: &str,
        _selector: &Selector,
        _color: Option<Color>,
        _cycles: u32,
        _period_s: f64,
    ) -> Result<Ack, ProviderError> {
        Ok(Ack::default())
    }
}

fn sample_device(id: &str) -> Device {
    Device {
        id: id.to_string(),
        account_id: Uuid::nil(),
        provider: "lifx".to_string(),
        label: format!("Lamp {id}"),
        power: Power::On,
        brightness: 1.0,
        color: Some(Color {
            hue: 0.0,
            saturation: 0.0,
            kelvin: 3500,
        }),
        connected: true,
        reachable: true,
        group: None,
        location: None,
        capabilities: vec![Capability::Brightness],
        metadata: HashMap::new(),
    }
}

fn build_service(
    mock: Arc<MockProviderClient>,
    rate_limit_per_min: u32,
) -> (Arc<DeviceService>, Arc<InMemoryAccountStore>, Arc<InMemoryCoordinator>) {
    let store = Arc::new(InMemoryAccountStore::default());
    let coordinator = Arc::new(InMemoryCoordinator::default());

    let mut providers: HashMap<Provider, Arc<dyn ProviderClient>> = HashMap::new();
    providers.insert(Provider::Lifx, mock);

    let service = Arc::new(DeviceService::new(
        store.clone(),
        coordinator.clone(),
        providers,
        [3u8; 32],
        Duration::from_secs(60),
        rate_limit_per_min,
    ));

    (service, store, coordinator)
}

#[tokio::test]
async fn connect_happy_path_then_list_accounts() {
    let mock = Arc::new(MockProviderClient::new(vec![sample_device("d1")]));
    let (service, _store, _coord) = build_service(mock, 30);
    let user = Uuid::new_v4();

    let projection = service
        .connect_account(user, Provider::Lifx, "token-abc")
        .await
        .unwrap();
    assert_eq!(projection.provider, "lifx");
    assert_eq!(projection.provider_account_id, "loc-1");
    assert_eq!(
        projection.metadata.get("lights_count"),
        Some(&Value::from(1))
    );

    let accounts = service.list_accounts(user).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].id, projection.id);
}

#[tokio::test]
async fn unauthorized_disconnect_does_not_remove_account() {
    let mock = Arc::new(MockProviderClient::new(vec![sample_device("d1")]));
    let (service, _store, _coord) = build_service(mock, 30);
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();

    let projection = service
        .connect_account(owner, Provider::Lifx, "token-abc")
        .await
        .unwrap();

    let err = service
        .delete_account(intruder, projection.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let accounts = service.list_accounts(owner).await.unwrap();
    assert_eq!(accounts.len(), 1);
}

#[tokio::test]
async fn cached_list_calls_upstream_once() {
    let mock = Arc::new(MockProviderClient::new(vec![
        sample_device("d1"),
        sample_device("d2"),
    ]));
    let (service, _store, _coord) = build_service(mock.clone(), 30);
    let user = Uuid::new_v4();
    let account = service
        .connect_account(user, Provider::Lifx, "token-abc")
        .await
        .unwrap();

    let first = service.list_account_devices(user, account.id).await.unwrap();
    assert_eq!(first.len(), 2);
    let second = service.list_account_devices(user, account.id).await.unwrap();
    assert_eq!(second.len(), 2);

    assert_eq!(mock.list_call_count(), 1);
}

#[tokio::test]
async fn mutation_invalidates_cache() {
    let mock = Arc::new(MockProviderClient::new(vec![sample_device("d1")]));
    let (service, _store, _coord) = build_service(mock.clone(), 30);
    let user = Uuid::new_v4();
    let account = service
        .connect_account(user, Provider::Lifx, "token-abc")
        .await
        .unwrap();

    service.list_account_devices(user, account.id).await.unwrap();
    assert_eq!(mock.list_call_count(), 1);

    let req = ActionRequest {
        action: "power".to_string(),
        parameters: ActionParameters {
            state: Some("off".to_string()),
            duration: Some(0.0),
            ..Default::default()
        },
    };
    let validated = action::validate(&req).unwrap();
    service
        .execute_action(user, account.id, &Selector::Id("d1".to_string()), &validated)
        .await
        .unwrap();

    service.list_account_devices(user, account.id).await.unwrap();
    assert_eq!(mock.list_call_count(), 2);
}

#[tokio::test]
async fn rate_limit_cuts_off_then_recovers() {
    let mock = Arc::new(MockProviderClient::new(vec![sample_device("d1")]));
    let (service, _store, _coord) = build_service(mock, 3);
    let user = Uuid::new_v4();
    let account = service
        .connect_account(user, Provider::Lifx, "token-abc")
        .await
        .unwrap();

    for _ in 0..3 {
        service.get_device(user, account.id, "d1").await.unwrap();
    }
    let err = service.get_device(user, account.id, "d1").await.unwrap_err();
    assert!(matches!(err, AppError::RateLimited));
}

#[tokio::test]
async fn list_devices_skips_failing_account_but_succeeds_overall() {
    let mock = Arc::new(MockProviderClient::new(vec![sample_device("d1")]));
    let (service, store, _coord) = build_service(mock, 30);
    let user = Uuid::new_v4();

    service
        .connect_account(user, Provider::Lifx, "token-abc")
        .await
        .unwrap();

    // A second account whose stored token fails to decrypt under the
    // service's key — the pipeline must log and skip it, not fail the call.
    store
        .create(
            user,
            Provider::Lifx,
            "loc-2".to_string(),
            vec![0u8; 28],
            HashMap::new(),
        )
        .await
        .ok();

    let devices = service.list_devices(user).await.unwrap();
    assert!(!devices.is_empty());
}

#[tokio::test]
async fn coordinator_denial_surfaces_as_unavailable() {
    struct AlwaysFailingCoordinator;

    #[async_trait]
    impl Coordinator for AlwaysFailingCoordinator {
        async fn get_devices(&self, _account_id: Uuid) -> Option<Vec<Device>> {
            None
        }
        async fn set_devices(&self, _account_id: Uuid, _devices: &[Device], _ttl: Duration) {}
        async fn delete_devices(&self, _account_id: Uuid) {}
        async fn check_rate_limit(
            &self,
            _account_id: Uuid,
            _limit_per_min: u32,
        ) -> Result<RateLimitDecision, lighting_bridge_backend::coordinator::CoordinatorError>
        {
            Err(lighting_bridge_backend::coordinator::CoordinatorError::Backend(
                "simulated outage".to_string(),
            ))
        }
        async fn ping(
            &self,
        ) -> Result<(), lighting_bridge_backend::coordinator::CoordinatorError> {
            Err(lighting_bridge_backend::coordinator::CoordinatorError::Backend(
                "simulated outage".to_string(),
            ))
        }
    }

    let mock = Arc::new(MockProviderClient::new(vec![sample_device("d1")]));
    let store = Arc::new(InMemoryAccountStore::default());
    let coordinator = Arc::new(AlwaysFailingCoordinator);
    let mut providers: HashMap<Provider, Arc<dyn ProviderClient>> = HashMap::new();
    providers.insert(Provider::Lifx, mock);

    let service = Arc::new(DeviceService::new(
        store.clone(),
        coordinator,
        providers,
        [3u8; 32],
        Duration::from_secs(60),
        30,
    ));

    let user = Uuid::new_v4();
    let account = store
        .create(
            user,
            Provider::Lifx,
            "loc-1".to_string(),
            lighting_bridge_backend::crypto::seal(&[3u8; 32], b"token").unwrap(),
            HashMap::new(),
        )
        .await
        .unwrap();

    let err = service
        .list_account_devices(user, account.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unavailable));
}
