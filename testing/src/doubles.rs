//! Instrumented port doubles for engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cs_core::{ConfigItem, ConfigSet, ConfigStore, JsonCache, MaxAge, Ttl};
use errors::ConfigError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Store wrapper counting `get_set` calls, optionally slowing them down so
/// concurrent reads overlap.
pub struct CountingStore {
    inner: Arc<dyn ConfigStore>,
    get_set_calls: AtomicUsize,
    get_set_delay: Duration,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn ConfigStore>) -> Self {
        Self {
            inner,
            get_set_calls: AtomicUsize::new(0),
            get_set_delay: Duration::ZERO,
        }
    }

    pub fn with_get_set_delay(mut self, delay: Duration) -> Self {
        self.get_set_delay = delay;
        self
    }

    pub fn get_set_calls(&self) -> usize {
        self.get_set_calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.get_set_calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigStore for CountingStore {
    async fn create_set(&self, set: ConfigSet) -> Result<ConfigSet, ConfigError> {
        self.inner.create_set(set).await
    }

    async fn get_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        self.get_set_calls.fetch_add(1, Ordering::SeqCst);
        if !self.get_set_delay.is_zero() {
            tokio::time::sleep(self.get_set_delay).await;
        }
        self.inner.get_set(name).await
    }

    async fn get_set_names(&self, limit: usize, skip: usize) -> Result<Vec<String>, ConfigError> {
        self.inner.get_set_names(limit, skip).await
    }

    async fn delete_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        self.inner.delete_set(name).await
    }

    async fn rename_set(
        &self,
        name: &str,
        new_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfigSet, ConfigError> {
        self.inner.rename_set(name, new_name, now).await
    }

    async fn add_item(&self, item: ConfigItem, set_name: &str) -> Result<ConfigSet, ConfigError> {
        self.inner.add_item(item, set_name).await
    }

    async fn update_item(
        &self,
        item: ConfigItem,
        set_name: &str,
    ) -> Result<ConfigSet, ConfigError> {
        self.inner.update_item(item, set_name).await
    }

    async fn remove_item(&self, key: &str, set_name: &str) -> Result<ConfigSet, ConfigError> {
        self.inner.remove_item(key, set_name).await
    }
}

/// Cache wrapper counting every call, by kind.
pub struct RecordingCache {
    inner: Arc<dyn JsonCache>,
    saves: AtomicUsize,
    gets: AtomicUsize,
    removes: AtomicUsize,
}

impl RecordingCache {
    pub fn new(inner: Arc<dyn JsonCache>) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Saves plus removes.
    pub fn mutations(&self) -> usize {
        self.saves() + self.removes()
    }
}

#[async_trait]
impl JsonCache for RecordingCache {
    async fn save_json(&self, json: &[u8], key: &str, ttl: Ttl) -> Result<(), ConfigError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_json(json, key, ttl).await
    }

    async fn get_json(&self, key: &str, max_age: MaxAge) -> Result<Vec<u8>, ConfigError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_json(key, max_age).await
    }

    async fn remove_json(&self, key: &str) -> Result<(), ConfigError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_json(key).await
    }
}

/// Cache whose every operation fails, standing in for an unreachable cache
/// server.
#[derive(Default)]
pub struct FailingCache {
    calls: AtomicUsize,
}

impl FailingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> ConfigError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ConfigError::internal("cache unavailable")
    }
}

#[async_trait]
impl JsonCache for FailingCache {
    async fn save_json(&self, _json: &[u8], _key: &str, _ttl: Ttl) -> Result<(), ConfigError> {
        Err(self.fail())
    }

    async fn get_json(&self, _key: &str, _max_age: MaxAge) -> Result<Vec<u8>, ConfigError> {
        Err(self.fail())
    }

    async fn remove_json(&self, _key: &str) -> Result<(), ConfigError> {
        Err(self.fail())
    }
}
