//! Lighting bridge backend
//!
//! Multi-tenant HTTP service that brokers access to third-party smart
//! lighting accounts (currently LIFX) behind one neutral device API, with a
//! per-account device cache and sliding-window rate limit shared across
//! replicas via Redis.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use lighting_bridge_backend::account::{AccountStore, PgAccountStore, Provider};
use lighting_bridge_backend::config::AppConfig;
use lighting_bridge_backend::coordinator::{Coordinator, RedisCoordinator};
use lighting_bridge_backend::provider::lifx::LifxClient;
use lighting_bridge_backend::provider::ProviderClient;
use lighting_bridge_backend::router;
use lighting_bridge_backend::service::DeviceService;
use lighting_bridge_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn,sqlx=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env()?;

    info!(
        port = config.http_port,
        device_cache_ttl_secs = config.device_cache_ttl.as_secs(),
        rate_limit_per_min = config.rate_limit_per_min,
        "Starting lighting bridge backend"
    );

    let pool = sqlx::PgPool::connect(&config.database_url).await?;
    let store: Arc<dyn AccountStore> = Arc::new(PgAccountStore::new(pool));

    let coordinator: Arc<dyn Coordinator> = Arc::new(RedisCoordinator::new(&config.redis_url)?);

    let mut providers: HashMap<Provider, Arc<dyn ProviderClient>> = HashMap::new();
    providers.insert(
        Provider::Lifx,
        Arc::new(LifxClient::new(config.upstream_timeout)),
    );

    let service = Arc::new(DeviceService::new(
        store,
        coordinator,
        providers,
        config.encryption_key,
        config.device_cache_ttl,
        config.rate_limit_per_min,
    ));

    let state = AppState {
        service,
        config: config.clone(),
    };

    let app = router::build(state, config.upstream_timeout);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    info!(addr = %bind_addr, "Binding HTTP listener");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    let shutdown_grace = config.shutdown_grace;
    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_grace));

    serve.await?;

    info!("lighting bridge backend stopped");
    Ok(())
}

/// Resolves once Ctrl-C is received. A forced-exit timer starts at that
/// point so a request hung past the drain deadline can't keep the process
/// alive indefinitely (§5).
async fn shutdown_signal(grace: std::time::Duration) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl-C, draining in-flight requests");
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracing::warn!("shutdown grace period elapsed, forcing exit");
            std::process::exit(0);
        });
    }
}
