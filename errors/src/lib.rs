//! # Config Store Errors
//!
//! Error types shared by every crate of the config store.
//!
//! - `ConfigError`: domain and port errors surfaced by the resolution engine
//! - `StorageError`: backend failures raised inside storage adapters
//! - `SecretError`: failures raised by secret providers
//!
//! Backend and secret errors are folded into `ConfigError` at the port
//! boundary, so the engine only ever reasons about one error type.

use thiserror::Error;

/// Errors returned by the config store ports and the resolution engine.
///
/// `Clone` is required: a single collapsed execution hands the same result
/// to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Config set already exists: {name}")]
    DuplicatedConfig { name: String },

    #[error("Config set does not exist: {name}")]
    ConfigNotExists { name: String },

    #[error("Duplicated item key: {key}")]
    DuplicatedKey { key: String },

    #[error("Item key does not exist: {key}")]
    KeyNotExists { key: String },

    #[error("Secret does not exist: {name}")]
    SecretNotExists { name: String },

    #[error("Secret item {key} must hold a string value")]
    InvalidSecretValue { key: String },

    #[error("Nested item {key} must hold a string value")]
    InvalidNestedValue { key: String },

    #[error("Cyclic nested reference: {}", path.join(" -> "))]
    CyclicReference { path: Vec<String> },

    /// Soft staleness signal from the cache; never surfaced past the
    /// cache-aside read.
    #[error("Cached value for {key} is older than expected")]
    OldValue { key: String },

    #[error("Timeout: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl ConfigError {
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether the error describes a client-visible condition rather than an
    /// infrastructure failure.
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Internal { .. } | Self::Timeout { .. })
    }

    /// Cache lookups that should fall through to the store.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::ConfigNotExists { .. } | Self::OldValue { .. })
    }
}

/// Storage layer errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Connection to {backend} failed: {reason}")]
    ConnectionError { backend: String, reason: String },

    #[error("Query on {backend} failed: {reason}")]
    QueryError { backend: String, reason: String },

    #[error("Serialization error: {error_type} - {reason}")]
    SerializationError { error_type: String, reason: String },

    #[error("Transaction on {backend} failed: {reason}")]
    TransactionError { backend: String, reason: String },
}

impl From<StorageError> for ConfigError {
    fn from(err: StorageError) -> Self {
        ConfigError::Internal {
            reason: err.to_string(),
        }
    }
}

/// Secret provider errors
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Format error: {0}")]
    FormatError(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),
}

impl From<SecretError> for ConfigError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::NotFound(name) => ConfigError::SecretNotExists { name },
            other => ConfigError::Internal {
                reason: other.to_string(),
            },
        }
    }
}
