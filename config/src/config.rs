//! # Configuration Structures
//!
//! This module defines the configuration structures of the config store
//! service.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization, every field defaulted
//! - Use `validator` for input validation
//! - Include M-CANONICAL-DOCS on the public entry points

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Main configuration structure for the config store.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Aggregates the settings of every collaborator the resolution engine is
/// wired to: the Redis backend, the JSON cache policy, the request-collapsing
/// front, the store's write loop, the secret provider and logging.
///
/// ## Usage
/// ```rust,no_run
/// use config::Config;
///
/// let config = Config::default();
/// println!("Redis: {}", config.redis.url());
/// ```
///
/// ## Validation
/// Nested configurations are validated with their own rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct Config {
    /// Redis connection, shared by store, cache and feature flags
    #[serde(default)]
    #[validate(nested)]
    pub redis: RedisConfig,

    /// Flattened JSON cache policy
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Request-collapsing front
    #[serde(default)]
    #[validate(nested)]
    pub collapse: CollapseConfig,

    /// Persistent store write behaviour
    #[serde(default)]
    #[validate(nested)]
    pub store: StoreConfig,

    /// Secret provider selection
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Logging and metrics
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// Redis configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Fields
/// - `host`: Redis host (default: "127.0.0.1")
/// - `port`: Redis port (default: 6379)
/// - `username` / `password`: omit when the server has no authentication
/// - `db`: database number (default: 1, range: 0-15)
/// - `connection_timeout_ms`: connect timeout (default: 10000)
/// - `max_retries`: extra attempts of the initial connect (default: 3)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    #[serde(default = "default_redis_port")]
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_redis_db")]
    #[validate(range(min = 0, max = 15))]
    pub db: u8,

    #[serde(default = "default_redis_connection_timeout_ms")]
    #[validate(range(min = 1, max = 300000))]
    pub connection_timeout_ms: u64,

    #[serde(default = "default_redis_max_retries")]
    #[validate(range(min = 0, max = 100))]
    pub max_retries: u32,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_db() -> u8 {
    1
}

fn default_redis_connection_timeout_ms() -> u64 {
    10_000
}

fn default_redis_max_retries() -> u32 {
    3
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            username: None,
            password: None,
            db: default_redis_db(),
            connection_timeout_ms: default_redis_connection_timeout_ms(),
            max_retries: default_redis_max_retries(),
        }
    }
}

impl RedisConfig {
    /// Connection string in the `redis://[user[:password]@]host:port/db`
    /// form. Credentials are percent-encoded.
    pub fn url(&self) -> String {
        let user = self.username.as_deref().map(urlencoding::encode);
        let password = self.password.as_deref().map(urlencoding::encode);
        let auth = match (user, password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (Some(user), None) => format!("{}@", user),
            (None, Some(password)) => format!(":{}@", password),
            (None, None) => String::new(),
        };
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Flattened JSON cache policy. `ttl_seconds` absent means entries never
/// expire.
///
/// `version_horizon_seconds` is how long the cache writer remembers the last
/// version written or deleted per set; it must exceed the longest flatten.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CacheConfig {
    #[serde(default)]
    #[validate(range(min = 1))]
    pub ttl_seconds: Option<u64>,

    #[serde(default = "default_version_horizon_seconds")]
    #[validate(range(min = 1, max = 86400))]
    pub version_horizon_seconds: u64,
}

fn default_version_horizon_seconds() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: None,
            version_horizon_seconds: default_version_horizon_seconds(),
        }
    }
}

impl CacheConfig {
    pub fn version_horizon(&self) -> Duration {
        Duration::from_secs(self.version_horizon_seconds)
    }
}

/// Request-collapsing front configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Fields
/// - `flag_name`: feature flag consulted per request (default:
///   "single_flight_on")
/// - `timeout_ms`: how long one caller waits for a shared execution
///   (default: 500, range: 1-60000)
/// - `default_enabled`: status used when the flag is not stored
///   (default: false)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CollapseConfig {
    #[serde(default = "default_collapse_flag_name")]
    #[validate(length(min = 1, max = 255))]
    pub flag_name: String,

    #[serde(default = "default_collapse_timeout_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub timeout_ms: u64,

    #[serde(default)]
    pub default_enabled: bool,
}

fn default_collapse_flag_name() -> String {
    "single_flight_on".to_string()
}

fn default_collapse_timeout_ms() -> u64 {
    500
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            flag_name: default_collapse_flag_name(),
            timeout_ms: default_collapse_timeout_ms(),
            default_enabled: false,
        }
    }
}

impl CollapseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct StoreConfig {
    /// Compare-and-swap attempts before an item mutation gives up
    #[serde(default = "default_cas_max_retries")]
    #[validate(range(min = 1, max = 1000))]
    pub cas_max_retries: u32,
}

fn default_cas_max_retries() -> u32 {
    16
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cas_max_retries: default_cas_max_retries(),
        }
    }
}

/// Which secret provider resolves secret items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider")]
pub enum SecretsConfig {
    #[serde(rename = "aws-secrets-manager")]
    Aws {
        #[serde(default = "default_aws_region")]
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
    #[serde(rename = "vault")]
    Vault {
        address: String,
        token: String,
        #[serde(default = "default_vault_mount_path")]
        mount_path: String,
    },
    #[serde(rename = "local")]
    Local {
        #[serde(default)]
        secrets: HashMap<String, String>,
    },
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

fn default_vault_mount_path() -> String {
    "secret".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        SecretsConfig::Local {
            secrets: HashMap::new(),
        }
    }
}

/// Observability configuration.
///
/// ## Fields
/// - `logging_level`: trace/debug/info/warn/error (default: "info"),
///   overridden by `RUST_LOG`
/// - `metrics_enabled`: record `metrics` counters (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    #[serde(default = "default_logging_level")]
    #[validate(custom(function = "validate_logging_level"))]
    pub logging_level: String,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn validate_logging_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level")),
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging_level: default_logging_level(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}
