//! # Resolution Engine
//!
//! `ConfigService` orchestrates the store, secret and cache ports: set and
//! item lifecycle operations, recursive flattening, and cache-aside reads of
//! the flattened JSON.
//!
//! Every successful mutation recomputes the set's JSON and queues it for the
//! cache. Cache writes never block nor fail the caller; a cache outage
//! degrades reads to always-fresh store reads.

use crate::cache_writer::{CacheWriter, DEFAULT_VERSION_HORIZON};
use crate::error::ItemMutationError;
use crate::flatten::Flattener;
use crate::telemetry::{CacheLookup, ServiceTelemetry};
use bytes::Bytes;
use chrono::Utc;
use cs_core::{ConfigItem, ConfigSet, ConfigStore, JsonCache, MaxAge, SecretProvider, Ttl};
use errors::ConfigError;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

pub struct ConfigService {
    store: Arc<dyn ConfigStore>,
    cache: Arc<dyn JsonCache>,
    secrets: Arc<dyn SecretProvider>,
    cache_writer: CacheWriter,
    telemetry: ServiceTelemetry,
}

/// Builder for [`ConfigService`].
pub struct ConfigServiceBuilder {
    store: Arc<dyn ConfigStore>,
    cache: Arc<dyn JsonCache>,
    secrets: Arc<dyn SecretProvider>,
    ttl: Ttl,
    version_horizon: Duration,
    telemetry: ServiceTelemetry,
}

impl ConfigServiceBuilder {
    pub fn ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = ttl;
        self
    }

    /// How long the cache writer remembers the last version per set.
    pub fn version_horizon(mut self, horizon: Duration) -> Self {
        self.version_horizon = horizon;
        self
    }

    pub fn telemetry(mut self, telemetry: ServiceTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Starts the cache writer task; must run inside a Tokio runtime.
    pub fn build(self) -> ConfigService {
        let (cache_writer, _handle) =
            CacheWriter::start(
                Arc::clone(&self.cache),
                self.ttl,
                self.version_horizon,
                self.telemetry,
            );
        ConfigService {
            store: self.store,
            cache: self.cache,
            secrets: self.secrets,
            cache_writer,
            telemetry: self.telemetry,
        }
    }
}

impl ConfigService {
    pub fn builder(
        store: Arc<dyn ConfigStore>,
        cache: Arc<dyn JsonCache>,
        secrets: Arc<dyn SecretProvider>,
    ) -> ConfigServiceBuilder {
        ConfigServiceBuilder {
            store,
            cache,
            secrets,
            ttl: Ttl::Infinite,
            version_horizon: DEFAULT_VERSION_HORIZON,
            telemetry: ServiceTelemetry::default(),
        }
    }

    /// Service with infinite cache TTL and metrics enabled.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        cache: Arc<dyn JsonCache>,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self::builder(store, cache, secrets).build()
    }

    /// Creates an empty set and caches its (empty object) JSON.
    #[instrument(skip(self))]
    pub async fn create_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        let set = self.store.create_set(ConfigSet::new(name, Utc::now())).await?;
        info!(set = %set.name, "Config set created");
        self.refresh_cache(&set).await;
        Ok(set)
    }

    #[instrument(skip(self))]
    pub async fn get_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        self.store.get_set(name).await
    }

    /// Flattened JSON of a set, served from the cache when an entry younger
    /// than `max_age` exists.
    ///
    /// A miss, a stale entry or a failing cache falls through to the store;
    /// the freshly computed JSON is then queued for the cache.
    #[instrument(skip(self, max_age), fields(max_age = %max_age))]
    pub async fn get_set_json(&self, name: &str, max_age: MaxAge) -> Result<Bytes, ConfigError> {
        match self.cache.get_json(name, max_age).await {
            Ok(json) => {
                debug!(set = name, "Cache hit");
                self.telemetry.record_cache_lookup(CacheLookup::Hit);
                return Ok(Bytes::from(json));
            }
            Err(ConfigError::OldValue { .. }) => {
                debug!(set = name, "Cached JSON is stale");
                self.telemetry.record_cache_lookup(CacheLookup::Stale);
            }
            Err(ConfigError::ConfigNotExists { .. }) => {
                debug!(set = name, "Cache miss");
                self.telemetry.record_cache_lookup(CacheLookup::Miss);
            }
            Err(e) => {
                warn!(set = name, error = %e, "Cache lookup failed, reading from store");
                self.telemetry.record_cache_lookup(CacheLookup::Error);
            }
        }

        let set = self.store.get_set(name).await?;
        let json = self.set_to_json(&set).await?;
        self.cache_writer.save(&set.name, json.clone(), set.updated_at);
        Ok(json)
    }

    pub async fn get_set_names(&self, limit: usize, skip: usize) -> Result<Vec<String>, ConfigError> {
        self.store.get_set_names(limit, skip).await
    }

    /// Moves a set to `new_name` in one store operation, then drops the old
    /// cache entry and caches the JSON under the new name.
    #[instrument(skip(self))]
    pub async fn rename_set(&self, name: &str, new_name: &str) -> Result<ConfigSet, ConfigError> {
        let renamed = self.store.rename_set(name, new_name, Utc::now()).await?;
        info!(from = name, to = %renamed.name, "Config set renamed");
        self.cache_writer.remove(name, renamed.updated_at);
        self.refresh_cache(&renamed).await;
        Ok(renamed)
    }

    /// Deletes a set. The cache is only touched once the store delete
    /// succeeded.
    #[instrument(skip(self))]
    pub async fn delete_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        let deleted = self.store.delete_set(name).await?;
        info!(set = name, "Config set deleted");
        self.cache_writer.remove(name, deleted.updated_at);
        Ok(deleted)
    }

    #[instrument(skip(self, item), fields(key = %item.key))]
    pub async fn add_item(
        &self,
        item: ConfigItem,
        set_name: &str,
    ) -> Result<ConfigSet, ItemMutationError> {
        let result = self.store.add_item(item, set_name).await;
        self.finish_item_mutation(set_name, result).await
    }

    #[instrument(skip(self, item), fields(key = %item.key))]
    pub async fn update_item(
        &self,
        item: ConfigItem,
        set_name: &str,
    ) -> Result<ConfigSet, ItemMutationError> {
        let result = self.store.update_item(item, set_name).await;
        self.finish_item_mutation(set_name, result).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        key: &str,
        set_name: &str,
    ) -> Result<ConfigSet, ItemMutationError> {
        let result = self.store.remove_item(key, set_name).await;
        self.finish_item_mutation(set_name, result).await
    }

    /// Serialized flattened JSON of `set`.
    pub async fn set_to_json(&self, set: &ConfigSet) -> Result<Bytes, ConfigError> {
        let flattened = self.flatten(set).await?;
        serde_json::to_vec(&Value::Object(flattened))
            .map(Bytes::from)
            .map_err(|e| ConfigError::internal(format!("JSON serialization failed: {}", e)))
    }

    pub async fn flatten(&self, set: &ConfigSet) -> Result<Map<String, Value>, ConfigError> {
        let started = Instant::now();
        let result = Flattener::new(self.store.as_ref(), self.secrets.as_ref())
            .flatten(set)
            .await;
        self.telemetry.record_flatten_duration(started.elapsed());
        result
    }

    /// Waits until every cache write queued so far has been applied.
    pub async fn flush_cache_writes(&self) {
        self.cache_writer.flush().await;
    }

    async fn finish_item_mutation(
        &self,
        set_name: &str,
        result: Result<ConfigSet, ConfigError>,
    ) -> Result<ConfigSet, ItemMutationError> {
        match result {
            Ok(set) => {
                debug!(set = set_name, "Config set mutated");
                self.refresh_cache(&set).await;
                Ok(set)
            }
            Err(error @ (ConfigError::DuplicatedKey { .. } | ConfigError::KeyNotExists { .. })) => {
                match self.store.get_set(set_name).await {
                    Ok(current) => Err(ItemMutationError::with_current(error, current)),
                    Err(e) => {
                        warn!(set = set_name, error = %e, "Failed to read set after rejected mutation");
                        Err(ItemMutationError::new(error))
                    }
                }
            }
            Err(error) => Err(ItemMutationError::new(error)),
        }
    }

    // A set that no longer flattens (missing secret or nested set, cycle)
    // must not keep serving its previous JSON.
    async fn refresh_cache(&self, set: &ConfigSet) {
        match self.set_to_json(set).await {
            Ok(json) => self.cache_writer.save(&set.name, json, set.updated_at),
            Err(e) => {
                warn!(set = %set.name, error = %e, "Failed to flatten set, dropping cached JSON");
                self.cache_writer.invalidate(&set.name, set.updated_at);
            }
        }
    }
}
