//! Redis-backed feature flags.
//!
//! Each flag is a hash at `flags:{name}` with a `status` field (`"1"` when
//! on) and an optional JSON `data` field.

use async_trait::async_trait;
use cs_core::{FlagProvider, ToggleFlag};
use errors::{ConfigError, StorageError};
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const FLAG_PREFIX: &str = "flags:";
const STATUS_KEY: &str = "status";
const DATA_KEY: &str = "data";

pub struct RedisToggleRepo {
    connection_manager: redis::aio::ConnectionManager,
}

impl RedisToggleRepo {
    pub fn new(connection_manager: redis::aio::ConnectionManager) -> Self {
        Self { connection_manager }
    }

    fn flag_key(name: &str) -> String {
        format!("{}{}", FLAG_PREFIX, name)
    }
}

fn parse_flag(fields: &HashMap<String, String>, default_status: bool) -> ToggleFlag {
    let status = match fields.get(STATUS_KEY) {
        Some(raw) => raw == "1" || raw.eq_ignore_ascii_case("true"),
        None => default_status,
    };
    let data = fields
        .get(DATA_KEY)
        .and_then(|raw| serde_json::from_str(raw).ok());
    ToggleFlag { status, data }
}

#[async_trait]
impl FlagProvider for RedisToggleRepo {
    async fn get_flag_with_default(&self, name: &str, default_status: bool) -> ToggleFlag {
        let mut conn = self.connection_manager.clone();
        let fields: Result<HashMap<String, String>, _> =
            conn.hgetall(Self::flag_key(name)).await;

        match fields {
            Ok(fields) => {
                debug!(flag = name, raw_status = ?fields.get(STATUS_KEY), "Toggle flag read");
                parse_flag(&fields, default_status)
            }
            Err(e) => {
                warn!(flag = name, error = %e, "Toggle flag lookup failed, using default");
                ToggleFlag::with_status(default_status)
            }
        }
    }

    async fn set_flag(
        &self,
        name: &str,
        status: bool,
        data: Option<serde_json::Value>,
    ) -> Result<(), ConfigError> {
        let key = Self::flag_key(name);
        let status = if status { "1" } else { "0" };

        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        match data {
            Some(data) => {
                let data = serde_json::to_string(&data).map_err(|e| {
                    StorageError::SerializationError {
                        error_type: "JSON".to_string(),
                        reason: e.to_string(),
                    }
                })?;
                pipe.hset_multiple(&key, &[(STATUS_KEY, status), (DATA_KEY, data.as_str())])
                    .ignore();
            }
            None => {
                pipe.hset(&key, STATUS_KEY, status).ignore();
            }
        }

        let mut conn = self.connection_manager.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::QueryError {
                backend: "Redis".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
