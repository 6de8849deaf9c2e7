//! # Storage Layer
//!
//! Adapters for the config store ports: in-memory, Redis, and secret
//! providers (AWS Secrets Manager, Vault, local).

pub mod memory;
pub mod redis;
pub mod secret_provider;
pub mod toggle;

pub use memory::{InMemoryCache, InMemoryFlags, InMemoryStore};
pub use redis::RedisStorage;
pub use secret_provider::{AwsSecretProvider, LocalSecretProvider, VaultSecretProvider};
pub use toggle::RedisToggleRepo;
