//! # Redis Adapters
//!
//! Redis-backed config store and JSON cache.
//!
//! Key layout:
//! - `set:{name}`: JSON body of a config set
//! - `index:set_names`: sorted set of names scored by creation time
//! - `json:{name}`: flattened JSON of a set
//! - `cache:json_age`: sorted set of cache write times (µs since epoch)
//!
//! Multi-key writes (create, delete, rename) run as Lua scripts so the name
//! index never drifts from the bodies. Item mutations use optimistic
//! compare-and-swap on the previously read body.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cs_core::{ConfigItem, ConfigSet, ConfigStore, JsonCache, MaxAge, Ttl};
use errors::{ConfigError, StorageError};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const SET_PREFIX: &str = "set:";
pub const SET_NAMES: &str = "index:set_names";
pub const JSON_PREFIX: &str = "json:";
pub const AGE_TRACKER: &str = "cache:json_age";

const DEFAULT_CAS_MAX_RETRIES: u32 = 16;

const CREATE_SCRIPT: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 1 then
    return 0
end
redis.call("SET", KEYS[1], ARGV[1])
redis.call("ZADD", KEYS[2], ARGV[2], ARGV[3])
return 1
"#;

const DELETE_SCRIPT: &str = r#"
local body = redis.call("GET", KEYS[1])
if not body then
    return false
end
redis.call("DEL", KEYS[1])
redis.call("ZREM", KEYS[2], ARGV[1])
return body
"#;

const CAS_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) ~= ARGV[1] then
    return 0
end
redis.call("SET", KEYS[1], ARGV[2])
return 1
"#;

const RENAME_SCRIPT: &str = r#"
local current = redis.call("GET", KEYS[1])
if not current then
    return -1
end
if redis.call("EXISTS", KEYS[2]) == 1 then
    return -2
end
if current ~= ARGV[1] then
    return 0
end
redis.call("DEL", KEYS[1])
redis.call("SET", KEYS[2], ARGV[2])
redis.call("ZREM", KEYS[3], ARGV[3])
redis.call("ZADD", KEYS[3], ARGV[5], ARGV[4])
return 1
"#;

pub fn set_key(name: &str) -> String {
    format!("{}{}", SET_PREFIX, name)
}

pub fn json_key(name: &str) -> String {
    format!("{}{}", JSON_PREFIX, name)
}

fn query_error(e: redis::RedisError) -> StorageError {
    StorageError::QueryError {
        backend: "Redis".to_string(),
        reason: e.to_string(),
    }
}

fn encode_set(set: &ConfigSet) -> Result<String, StorageError> {
    serde_json::to_string(set).map_err(|e| StorageError::SerializationError {
        error_type: "JSON".to_string(),
        reason: e.to_string(),
    })
}

fn decode_set(raw: &str) -> Result<ConfigSet, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::SerializationError {
        error_type: "JSON".to_string(),
        reason: e.to_string(),
    })
}

fn score_now() -> f64 {
    Utc::now().timestamp_micros() as f64
}

/// Inclusive `ZRANGE` bounds for a page, or `None` when the page is empty.
/// Indexes past `isize::MAX` would wrap to negative (tail-relative) ranks.
fn page_bounds(limit: usize, skip: usize) -> Option<(isize, isize)> {
    if limit == 0 || skip > isize::MAX as usize {
        return None;
    }
    let stop = skip.saturating_add(limit - 1).min(isize::MAX as usize);
    Some((skip as isize, stop as isize))
}

struct Scripts {
    create: redis::Script,
    delete: redis::Script,
    cas: redis::Script,
    rename: redis::Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            create: redis::Script::new(CREATE_SCRIPT),
            delete: redis::Script::new(DELETE_SCRIPT),
            cas: redis::Script::new(CAS_SCRIPT),
            rename: redis::Script::new(RENAME_SCRIPT),
        }
    }
}

pub struct RedisStorage {
    _client: Arc<redis::Client>,
    connection_manager: redis::aio::ConnectionManager,
    scripts: Arc<Scripts>,
    cas_max_retries: u32,
}

impl RedisStorage {
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(connection_string).map_err(|e| StorageError::ConnectionError {
                backend: "Redis".to_string(),
                reason: e.to_string(),
            })?;

        let connection_manager =
            client
                .get_connection_manager()
                .await
                .map_err(|e| StorageError::ConnectionError {
                    backend: "Redis".to_string(),
                    reason: e.to_string(),
                })?;

        info!("Redis connection established");

        Ok(Self {
            _client: Arc::new(client),
            connection_manager,
            scripts: Arc::new(Scripts::load()),
            cas_max_retries: DEFAULT_CAS_MAX_RETRIES,
        })
    }

    /// Upper bound on compare-and-swap attempts for one item mutation.
    pub fn with_cas_max_retries(mut self, retries: u32) -> Self {
        self.cas_max_retries = retries.max(1);
        self
    }

    /// A handle on the shared multiplexed connection, for adapters that live
    /// next to the store (feature flags).
    pub fn connection_manager(&self) -> redis::aio::ConnectionManager {
        self.connection_manager.clone()
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection_manager.clone();
        conn.get(key).await.map_err(query_error)
    }

    async fn mutate_set<F>(&self, set_name: &str, apply: F) -> Result<ConfigSet, ConfigError>
    where
        F: Fn(&mut ConfigSet) -> Result<(), ConfigError> + Send + Sync,
    {
        let key = set_key(set_name);

        for attempt in 0..self.cas_max_retries {
            let Some(raw) = self.get_raw(&key).await? else {
                return Err(ConfigError::ConfigNotExists {
                    name: set_name.to_string(),
                });
            };

            let mut set = decode_set(&raw)?;
            apply(&mut set)?;
            set.touch(Utc::now());
            let next = encode_set(&set)?;

            let mut conn = self.connection_manager.clone();
            let swapped: i32 = self
                .scripts
                .cas
                .key(&key)
                .arg(&raw)
                .arg(&next)
                .invoke_async(&mut conn)
                .await
                .map_err(query_error)?;

            if swapped == 1 {
                return Ok(set);
            }

            debug!(
                set = set_name,
                attempt, "Concurrent write on config set, retrying"
            );
            tokio::time::sleep(Duration::from_millis(1 << attempt.min(6))).await;
        }

        Err(StorageError::TransactionError {
            backend: "Redis".to_string(),
            reason: format!(
                "gave up writing {} after {} conflicting attempts",
                set_name, self.cas_max_retries
            ),
        }
        .into())
    }
}

#[async_trait]
impl ConfigStore for RedisStorage {
    async fn create_set(&self, set: ConfigSet) -> Result<ConfigSet, ConfigError> {
        let body = encode_set(&set)?;
        let mut conn = self.connection_manager.clone();

        let created: i32 = self
            .scripts
            .create
            .key(set_key(&set.name))
            .key(SET_NAMES)
            .arg(body)
            .arg(score_now())
            .arg(&set.name)
            .invoke_async(&mut conn)
            .await
            .map_err(query_error)?;

        if created == 0 {
            return Err(ConfigError::DuplicatedConfig { name: set.name });
        }
        Ok(set)
    }

    async fn get_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        match self.get_raw(&set_key(name)).await? {
            Some(raw) => Ok(decode_set(&raw)?),
            None => Err(ConfigError::ConfigNotExists {
                name: name.to_string(),
            }),
        }
    }

    async fn get_set_names(&self, limit: usize, skip: usize) -> Result<Vec<String>, ConfigError> {
        let Some((start, stop)) = page_bounds(limit, skip) else {
            return Ok(Vec::new());
        };
        let mut conn = self.connection_manager.clone();
        let names: Vec<String> = conn
            .zrange(SET_NAMES, start, stop)
            .await
            .map_err(query_error)?;
        Ok(names)
    }

    async fn delete_set(&self, name: &str) -> Result<ConfigSet, ConfigError> {
        let mut conn = self.connection_manager.clone();
        let body: Option<String> = self
            .scripts
            .delete
            .key(set_key(name))
            .key(SET_NAMES)
            .arg(name)
            .invoke_async(&mut conn)
            .await
            .map_err(query_error)?;

        match body {
            Some(raw) => Ok(decode_set(&raw)?),
            None => Err(ConfigError::ConfigNotExists {
                name: name.to_string(),
            }),
        }
    }

    async fn rename_set(
        &self,
        name: &str,
        new_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ConfigSet, ConfigError> {
        let old_key = set_key(name);
        let new_key = set_key(new_name);

        for attempt in 0..self.cas_max_retries {
            let Some(raw) = self.get_raw(&old_key).await? else {
                return Err(ConfigError::ConfigNotExists {
                    name: name.to_string(),
                });
            };

            let renamed = decode_set(&raw)?.renamed(new_name, now);
            let body = encode_set(&renamed)?;

            let mut conn = self.connection_manager.clone();
            let outcome: i32 = self
                .scripts
                .rename
                .key(&old_key)
                .key(&new_key)
                .key(SET_NAMES)
                .arg(&raw)
                .arg(body)
                .arg(name)
                .arg(new_name)
                .arg(score_now())
                .invoke_async(&mut conn)
                .await
                .map_err(query_error)?;

            match outcome {
                1 => return Ok(renamed),
                -1 => {
                    return Err(ConfigError::ConfigNotExists {
                        name: name.to_string(),
                    });
                }
                -2 => {
                    return Err(ConfigError::DuplicatedConfig {
                        name: new_name.to_string(),
                    });
                }
                _ => debug!(set = name, attempt, "Concurrent write during rename, retrying"),
            }
        }

        Err(StorageError::TransactionError {
            backend: "Redis".to_string(),
            reason: format!("gave up renaming {} to {}", name, new_name),
        }
        .into())
    }

    async fn add_item(&self, item: ConfigItem, set_name: &str) -> Result<ConfigSet, ConfigError> {
        self.mutate_set(set_name, |set| set.add(item.clone())).await
    }

    async fn update_item(
        &self,
        item: ConfigItem,
        set_name: &str,
    ) -> Result<ConfigSet, ConfigError> {
        self.mutate_set(set_name, |set| set.update(item.clone()).map(|_| ()))
            .await
    }

    async fn remove_item(&self, key: &str, set_name: &str) -> Result<ConfigSet, ConfigError> {
        self.mutate_set(set_name, |set| set.remove(key).map(|_| ()))
            .await
    }
}

#[async_trait]
impl JsonCache for RedisStorage {
    async fn save_json(&self, json: &[u8], key: &str, ttl: Ttl) -> Result<(), ConfigError> {
        let mut conn = self.connection_manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.zadd(AGE_TRACKER, key, score_now()).ignore();
        match ttl {
            Ttl::Infinite => {
                pipe.set(json_key(key), json).ignore();
            }
            Ttl::Expires(d) => {
                let millis = (d.as_millis() as u64).max(1);
                pipe.pset_ex(json_key(key), json, millis).ignore();
            }
        }

        let _: () = pipe.query_async(&mut conn).await.map_err(query_error)?;
        Ok(())
    }

    async fn get_json(&self, key: &str, max_age: MaxAge) -> Result<Vec<u8>, ConfigError> {
        let mut conn = self.connection_manager.clone();
        let miss = || ConfigError::ConfigNotExists {
            name: key.to_string(),
        };

        if let MaxAge::Within(_) = max_age {
            let score: Option<f64> = conn
                .zscore(AGE_TRACKER, key)
                .await
                .map_err(query_error)?;
            let written_at = score
                .and_then(|micros| DateTime::from_timestamp_micros(micros as i64))
                .ok_or_else(miss)?;

            if max_age.is_stale(written_at, Utc::now()) {
                return Err(ConfigError::OldValue {
                    key: key.to_string(),
                });
            }
        }

        let json: Option<Vec<u8>> = conn.get(json_key(key)).await.map_err(query_error)?;
        json.ok_or_else(miss)
    }

    async fn remove_json(&self, key: &str) -> Result<(), ConfigError> {
        let mut conn = self.connection_manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .zrem(AGE_TRACKER, key)
            .ignore()
            .del(json_key(key))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(set_key("payments"), "set:payments");
        assert_eq!(json_key("payments"), "json:payments");
    }

    #[test]
    fn test_index_keys_cannot_collide_with_set_names() {
        // A set named "names" or "age" must not overwrite an index.
        assert_ne!(set_key("names"), SET_NAMES);
        assert_ne!(json_key("age"), AGE_TRACKER);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(0, 0), None);
        assert_eq!(page_bounds(10, 0), Some((0, 9)));
        assert_eq!(page_bounds(3, 5), Some((5, 7)));
        assert_eq!(page_bounds(1, usize::MAX), None);
        assert_eq!(page_bounds(1, isize::MAX as usize + 1), None);
        assert_eq!(page_bounds(usize::MAX, 1), Some((1, isize::MAX)));
        assert_eq!(
            page_bounds(usize::MAX, isize::MAX as usize),
            Some((isize::MAX, isize::MAX))
        );
    }

    #[test]
    fn test_set_body_roundtrip() {
        let mut set = ConfigSet::new("s", Utc::now());
        set.add(ConfigItem::nested("n", "other")).unwrap();

        let raw = encode_set(&set).unwrap();
        assert_eq!(decode_set(&raw).unwrap(), set);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_set("not json").unwrap_err();
        assert!(matches!(err, StorageError::SerializationError { .. }));
    }

    #[tokio::test]
    async fn test_redis_storage_error_handling() {
        let result = RedisStorage::new("not-a-valid-url").await;
        assert!(result.is_err());

        if let Err(StorageError::ConnectionError { backend, .. }) = result {
            assert_eq!(backend, "Redis");
        } else {
            panic!("Expected ConnectionError for invalid URL");
        }
    }

    #[test]
    fn test_port_trait_bounds() {
        fn assert_store<T: ConfigStore>() {}
        fn assert_cache<T: JsonCache>() {}

        assert_store::<RedisStorage>();
        assert_cache::<RedisStorage>();
    }
}
