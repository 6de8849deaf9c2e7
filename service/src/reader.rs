//! Read front of the engine: picks a [`ReadStrategy`] per request from the
//! feature flag and serves `GetSetJson` directly or through the request
//! collapser.

use crate::collapse::RequestCollapser;
use crate::engine::ConfigService;
use crate::telemetry::ServiceTelemetry;
use bytes::Bytes;
use config::CollapseConfig;
use cs_core::{FlagProvider, MaxAge};
use errors::ConfigError;
use std::sync::Arc;
use tracing::{debug, instrument};

/// How one `GetSetJson` request reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// Every caller runs its own read.
    Direct,
    /// Concurrent identical reads share one execution.
    Collapsed,
}

impl ReadStrategy {
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            ReadStrategy::Collapsed
        } else {
            ReadStrategy::Direct
        }
    }
}

/// Reads are collapsed on the full request identity.
pub type ReadKey = (String, MaxAge);

pub struct ConfigReader {
    service: Arc<ConfigService>,
    flags: Arc<dyn FlagProvider>,
    collapser: RequestCollapser<ReadKey, Bytes>,
    flag_name: String,
    default_enabled: bool,
}

impl ConfigReader {
    pub fn new(
        service: Arc<ConfigService>,
        flags: Arc<dyn FlagProvider>,
        settings: &CollapseConfig,
    ) -> Self {
        Self {
            service,
            flags,
            collapser: RequestCollapser::new(settings.timeout()),
            flag_name: settings.flag_name.clone(),
            default_enabled: settings.default_enabled,
        }
    }

    pub fn with_telemetry(mut self, telemetry: ServiceTelemetry) -> Self {
        self.collapser = self.collapser.with_telemetry(telemetry);
        self
    }

    pub fn service(&self) -> &Arc<ConfigService> {
        &self.service
    }

    /// Consults the feature flag once.
    pub async fn strategy(&self) -> ReadStrategy {
        let flag = self
            .flags
            .get_flag_with_default(&self.flag_name, self.default_enabled)
            .await;
        ReadStrategy::from_flag(flag.status)
    }

    #[instrument(skip(self, max_age), fields(max_age = %max_age))]
    pub async fn get_set_json(&self, name: &str, max_age: MaxAge) -> Result<Bytes, ConfigError> {
        let strategy = self.strategy().await;
        debug!(?strategy, "Resolved read strategy");
        self.get_set_json_with(strategy, name, max_age).await
    }

    pub async fn get_set_json_with(
        &self,
        strategy: ReadStrategy,
        name: &str,
        max_age: MaxAge,
    ) -> Result<Bytes, ConfigError> {
        match strategy {
            ReadStrategy::Direct => self.service.get_set_json(name, max_age).await,
            ReadStrategy::Collapsed => {
                let service = Arc::clone(&self.service);
                let owned_name = name.to_string();
                self.collapser
                    .run((name.to_string(), max_age), move || async move {
                        service.get_set_json(&owned_name, max_age).await
                    })
                    .await
            }
        }
    }
}
