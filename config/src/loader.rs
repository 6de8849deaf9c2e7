//! # Environment Variable Loader
//!
//! Applies environment overrides on top of a file or default configuration,
//! following 12-factor app principles.
//!
//! # Naming Convention
//! - `RD_*`: Redis settings
//! - `CACHE_*`: JSON cache settings
//! - `COLLAPSE_*`: request-collapsing settings
//! - `STORE_*`: store write settings
//! - `OB_*`: Observability settings
//! - `AWS_REGION` / `AWS_DEFAULT_REGION`: region of the AWS secret provider

use crate::ConfigLoadError;
use crate::config::{Config, SecretsConfig};
use std::env;

/// Load configuration from defaults plus environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Builds a configuration without any file, which is what containers and
/// tests usually want.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Redis: {}", config.redis.url());
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// ### Redis Settings (`RD_*`)
/// - `RD_HOST`: Redis host (default: "127.0.0.1")
/// - `RD_PORT`: Redis port (default: 6379)
/// - `RD_USERNAME` / `RD_PASSWORD`: credentials (default: none)
/// - `RD_DB`: Redis database number (default: 1)
/// - `RD_CONNECTION_TIMEOUT_MS`: connect timeout (default: 10000)
/// - `RD_MAX_RETRIES`: extra attempts of the initial connect (default: 3)
///
/// ### Cache Settings (`CACHE_*`)
/// - `CACHE_TTL_SECONDS`: TTL of cached JSON (default: infinite)
/// - `CACHE_VERSION_HORIZON_SECONDS`: how long write versions are remembered
///   (default: 300)
///
/// ### Collapse Settings (`COLLAPSE_*`)
/// - `COLLAPSE_FLAG_NAME`: gating feature flag (default: "single_flight_on")
/// - `COLLAPSE_TIMEOUT_MS`: per-waiter timeout (default: 500)
/// - `COLLAPSE_DEFAULT_ENABLED`: status when the flag is absent (default: false)
///
/// ### Store Settings (`STORE_*`)
/// - `STORE_CAS_MAX_RETRIES`: optimistic write attempts (default: 16)
///
/// ### Observability Settings (`OB_*`)
/// - `OB_LOGGING_LEVEL`: trace/debug/info/warn/error (default: "info")
/// - `OB_METRICS_ENABLED`: true/false (default: true)
///
/// ## Error Handling
/// A variable that is set but cannot be parsed is an error; unset variables
/// keep the current value.
pub fn load_from_env() -> Result<Config, ConfigLoadError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Overwrite fields of `config` with the environment variables that are set.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigLoadError> {
    apply_redis_overrides(config)?;

    if let Some(ttl) = parse_env("CACHE_TTL_SECONDS")? {
        config.cache.ttl_seconds = Some(ttl);
    }
    if let Some(horizon) = parse_env("CACHE_VERSION_HORIZON_SECONDS")? {
        config.cache.version_horizon_seconds = horizon;
    }

    if let Some(flag_name) = string_env("COLLAPSE_FLAG_NAME") {
        config.collapse.flag_name = flag_name;
    }
    if let Some(timeout_ms) = parse_env("COLLAPSE_TIMEOUT_MS")? {
        config.collapse.timeout_ms = timeout_ms;
    }
    if let Some(enabled) = parse_env("COLLAPSE_DEFAULT_ENABLED")? {
        config.collapse.default_enabled = enabled;
    }

    if let Some(retries) = parse_env("STORE_CAS_MAX_RETRIES")? {
        config.store.cas_max_retries = retries;
    }

    if let Some(level) = string_env("OB_LOGGING_LEVEL") {
        config.observability.logging_level = level;
    }
    if let Some(enabled) = parse_env("OB_METRICS_ENABLED")? {
        config.observability.metrics_enabled = enabled;
    }

    if let SecretsConfig::Aws { region, .. } = &mut config.secrets {
        if let Some(env_region) = string_env("AWS_REGION").or_else(|| string_env("AWS_DEFAULT_REGION")) {
            *region = env_region;
        }
    }

    Ok(())
}

fn apply_redis_overrides(config: &mut Config) -> Result<(), ConfigLoadError> {
    let redis = &mut config.redis;
    if let Some(host) = string_env("RD_HOST") {
        redis.host = host;
    }
    if let Some(port) = parse_env("RD_PORT")? {
        redis.port = port;
    }
    if let Some(username) = string_env("RD_USERNAME") {
        redis.username = Some(username);
    }
    if let Some(password) = string_env("RD_PASSWORD") {
        redis.password = Some(password);
    }
    if let Some(db) = parse_env("RD_DB")? {
        redis.db = db;
    }
    if let Some(timeout) = parse_env("RD_CONNECTION_TIMEOUT_MS")? {
        redis.connection_timeout_ms = timeout;
    }
    if let Some(retries) = parse_env("RD_MAX_RETRIES")? {
        redis.max_retries = retries;
    }
    Ok(())
}

fn string_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigLoadError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match string_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigLoadError::InvalidEnv {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}
