//! Process wiring: Redis, secret provider, engine and reader built from the
//! loaded configuration.

use anyhow::Result;
use config::{Config, RedisConfig, SecretsConfig};
use cs_core::{FlagProvider, SecretProvider, Ttl};
use service::{ConfigReader, ConfigService, ServiceTelemetry};
use std::sync::Arc;
use std::time::Duration;
use storage::{
    AwsSecretProvider, LocalSecretProvider, RedisStorage, RedisToggleRepo, VaultSecretProvider,
};
use tracing::{info, warn};

use crate::ux_error;

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

pub struct App {
    pub service: Arc<ConfigService>,
    pub reader: ConfigReader,
    pub flags: Arc<dyn FlagProvider>,
}

impl App {
    pub async fn connect(config: &Config) -> Result<Self> {
        let storage = Arc::new(
            connect_redis(&config.redis)
                .await?
                .with_cas_max_retries(config.store.cas_max_retries),
        );
        let flags: Arc<dyn FlagProvider> =
            Arc::new(RedisToggleRepo::new(storage.connection_manager()));
        let secrets = secret_provider(&config.secrets).await;
        let telemetry = ServiceTelemetry::new(config.observability.metrics_enabled);

        let service = Arc::new(
            ConfigService::builder(storage.clone(), storage, secrets)
                .ttl(Ttl::from_seconds(config.cache.ttl_seconds))
                .version_horizon(config.cache.version_horizon())
                .telemetry(telemetry)
                .build(),
        );
        let reader = ConfigReader::new(Arc::clone(&service), Arc::clone(&flags), &config.collapse)
            .with_telemetry(telemetry);

        Ok(Self {
            service,
            reader,
            flags,
        })
    }
}

/// Opens the store, retrying up to `max_retries` times; every attempt is
/// bounded by the connection timeout.
async fn connect_redis(settings: &RedisConfig) -> Result<RedisStorage> {
    let url = settings.url();
    let mut last_error = String::new();

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            tokio::time::sleep(RETRY_BACKOFF * attempt).await;
        }
        match tokio::time::timeout(settings.connection_timeout(), RedisStorage::new(&url)).await {
            Ok(Ok(storage)) => {
                info!(host = %settings.host, port = settings.port, db = settings.db, "Connected to Redis");
                return Ok(storage);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => {
                last_error = format!(
                    "no answer within {}ms",
                    settings.connection_timeout_ms
                );
            }
        }
        warn!(attempt, error = %last_error, "Redis connection attempt failed");
    }

    Err(ux_error::redis_unreachable(&settings.host, settings.port, &last_error).into())
}

async fn secret_provider(settings: &SecretsConfig) -> Arc<dyn SecretProvider> {
    match settings {
        SecretsConfig::Aws { region, endpoint } => {
            Arc::new(AwsSecretProvider::new(region.clone(), endpoint.clone()).await)
        }
        SecretsConfig::Vault {
            address,
            token,
            mount_path,
        } => Arc::new(VaultSecretProvider::new(
            address.clone(),
            token.clone(),
            mount_path.clone(),
        )),
        SecretsConfig::Local { secrets } => Arc::new(LocalSecretProvider::new(secrets.clone())),
    }
}
