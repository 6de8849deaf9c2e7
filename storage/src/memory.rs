//! # In-Memory Adapters
//!
//! Process-local implementations of the store, cache and flag ports, used
//! by tests and single-node development setups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cs_core::{ConfigItem, ConfigSet, ConfigStore, FlagProvider, JsonCache, MaxAge, ToggleFlag, Ttl};
use dashmap::DashMap;
use errors::ConfigError;
use parking_lot::Mutex;

/// Config sets held in a concurrent map plus an insertion-ordered name
/// index.
///
/// Item mutations run under the map's per-shard write lock, so mutations on
/// one set are serialized. Structural changes (create, delete, rename) also
/// hold the index lock to keep index and bodies in sync.
#[derive(Default)]
pub struct InMemoryStore {
    sets: DashMap<String, ConfigSet>,
    names: Mutex<Vec<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(name: &str) -> ConfigError {
        ConfigError::ConfigNotExists {
            name: name.to_string(),
        }
    }

    fn mutate<F>(&self, set_name: &str, apply: F) -> Result<ConfigSet, ConfigError>
    where
        F: FnOnce(&mut ConfigSet) -> Result<(), ConfigError>,
    {
        let mut entry = self
            .sets
            .get_mut(set_name)
            .ok_or_else(|| Self::not_found(set_name))?;

        let mut next = entry.clone();
        apply(&mut next)?;
        next.touch(Utc::now());
        *entry = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn create_set(&self, set: ConfigSet) -> Result<ConfigSet, ConfigError> {
        let mut names = self.names.lock();
        if self.sets.contains_key(&set.name) {
            return Err(ConfigError::DuplicatedConfig { name: set.name });
        }
        names.push(set.name.clone());
        self.sets.insert(set.name.clone(), set.clone());
        Ok(set)
    }

    async fn get_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        self.sets
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| Self::not_found(name))
    }

    async fn get_set_names(&self, limit: usize, skip: usize) -> Result<Vec<String>, ConfigError> {
        let names = self.names.lock();
        Ok(names.iter().skip(skip).take(limit).cloned().collect())
    }

    async fn delete_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        let mut names = self.names.lock();
        let (_, set) = self.sets.remove(name).ok_or_else(|| Self::not_found(name))?;
        names.retain(|n| n != name);
        Ok(set)
    }

    async fn rename_set(
        &self,
        name: &str,
        new_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfigSet, ConfigError> {
        let mut names = self.names.lock();
        if !self.sets.contains_key(name) {
            return Err(Self::not_found(name));
        }
        if self.sets.contains_key(new_name) {
            return Err(ConfigError::DuplicatedConfig {
                name: new_name.to_string(),
            });
        }

        let (_, set) = self.sets.remove(name).ok_or_else(|| Self::not_found(name))?;
        let renamed = set.renamed(new_name, now);
        self.sets.insert(new_name.to_string(), renamed.clone());
        names.retain(|n| n != name);
        names.push(new_name.to_string());
        Ok(renamed)
    }

    async fn add_item(&self, item: ConfigItem, set_name: &str) -> Result<ConfigSet, ConfigError> {
        self.mutate(set_name, |set| set.add(item))
    }

    async fn update_item(
        &self,
        item: ConfigItem,
        set_name: &str,
    ) -> Result<ConfigSet, ConfigError> {
        self.mutate(set_name, |set| set.update(item).map(|_| ()))
    }

    async fn remove_item(&self, key: &str, set_name: &str) -> Result<ConfigSet, ConfigError> {
        self.mutate(set_name, |set| set.remove(key).map(|_| ()))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    json: Vec<u8>,
    written_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

/// JSON cache with write-time tracking and lazy TTL eviction.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl JsonCache for InMemoryCache {
    async fn save_json(&self, json: &[u8], key: &str, ttl: Ttl) -> Result<(), ConfigError> {
        let now = Utc::now();
        let expires_at = match ttl {
            Ttl::Infinite => None,
            Ttl::Expires(d) => {
                let d = chrono::Duration::from_std(d)
                    .map_err(|e| ConfigError::internal(format!("invalid ttl: {e}")))?;
                Some(now + d)
            }
        };

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                json: json.to_vec(),
                written_at: now,
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_json(&self, key: &str, max_age: MaxAge) -> Result<Vec<u8>, ConfigError> {
        let now = Utc::now();
        let miss = || ConfigError::ConfigNotExists {
            name: key.to_string(),
        };

        let entry = self.entries.get(key).map(|e| e.clone()).ok_or_else(miss)?;

        if entry.expires_at.is_some_and(|at| at <= now) {
            self.entries.remove(key);
            return Err(miss());
        }

        if max_age.is_stale(entry.written_at, now) {
            return Err(ConfigError::OldValue {
                key: key.to_string(),
            });
        }

        Ok(entry.json)
    }

    async fn remove_json(&self, key: &str) -> Result<(), ConfigError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Feature flags held in memory.
#[derive(Default)]
pub struct InMemoryFlags {
    flags: DashMap<String, ToggleFlag>,
}

impl InMemoryFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(self, name: &str, status: bool) -> Self {
        self.flags
            .insert(name.to_string(), ToggleFlag::with_status(status));
        self
    }
}

#[async_trait]
impl FlagProvider for InMemoryFlags {
    async fn get_flag_with_default(&self, name: &str, default_status: bool) -> ToggleFlag {
        self.flags
            .get(name)
            .map(|flag| flag.clone())
            .unwrap_or_else(|| ToggleFlag::with_status(default_status))
    }

    async fn set_flag(
        &self,
        name: &str,
        status: bool,
        data: Option<serde_json::Value>,
    ) -> Result<(), ConfigError> {
        self.flags
            .insert(name.to_string(), ToggleFlag { status, data });
        Ok(())
    }
}
