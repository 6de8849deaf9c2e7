//! Ports consumed by the resolution engine.
//!
//! Every port is async and object safe so adapters can be injected as
//! `Arc<dyn Port>`.

use crate::types::{ConfigItem, ConfigSet, MaxAge, ToggleFlag, Ttl};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::ConfigError;

/// Durable store of config sets.
///
/// Implementations must serialize writes per set name: two concurrent item
/// mutations on the same set must both be applied, never one overwriting the
/// other.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Persists a new set. Fails with `DuplicatedConfig` if the name is taken.
    async fn create_set(&self, set: ConfigSet) -> Result<ConfigSet, ConfigError>;

    async fn get_set(&self, name: &str) -> Result<ConfigSet, ConfigError>;

    /// Set names in creation order.
    async fn get_set_names(&self, limit: usize, skip: usize) -> Result<Vec<String>, ConfigError>;

    /// Removes a set, returning its last stored state.
    async fn delete_set(&self, name: &str) -> Result<ConfigSet, ConfigError>;

    /// Atomically moves a set to a new name; either both names are updated or
    /// neither is.
    async fn rename_set(
        &self,
        name: &str,
        new_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfigSet, ConfigError>;

    async fn add_item(&self, item: ConfigItem, set_name: &str) -> Result<ConfigSet, ConfigError>;

    async fn update_item(&self, item: ConfigItem, set_name: &str)
    -> Result<ConfigSet, ConfigError>;

    async fn remove_item(&self, key: &str, set_name: &str) -> Result<ConfigSet, ConfigError>;
}

/// Disposable cache of flattened JSON documents.
#[async_trait]
pub trait JsonCache: Send + Sync {
    async fn save_json(&self, json: &[u8], key: &str, ttl: Ttl) -> Result<(), ConfigError>;

    /// Returns `ConfigNotExists` on a miss and `OldValue` when the entry was
    /// written longer ago than `max_age` allows.
    async fn get_json(&self, key: &str, max_age: MaxAge) -> Result<Vec<u8>, ConfigError>;

    async fn remove_json(&self, key: &str) -> Result<(), ConfigError>;
}

/// Resolves secret references to plaintext.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Retrieve a secret value by its identifier
    async fn get_secret(&self, secret_id: &str) -> Result<String, errors::SecretError>;

    /// Health check for the provider
    async fn is_available(&self) -> bool;
}

/// Feature flag lookups. Reads never fail; unknown flags resolve to a
/// default.
#[async_trait]
pub trait FlagProvider: Send + Sync {
    async fn get_flag(&self, name: &str) -> ToggleFlag {
        self.get_flag_with_default(name, false).await
    }

    async fn get_flag_with_default(&self, name: &str, default_status: bool) -> ToggleFlag;

    async fn set_flag(
        &self,
        name: &str,
        status: bool,
        data: Option<serde_json::Value>,
    ) -> Result<(), ConfigError>;
}
