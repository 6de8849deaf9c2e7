//! # Config Store Core
//!
//! Shared types and ports for the config store.
//!
//! This crate provides:
//! - The data model: config items, config sets, feature flags
//! - Cache policy types (`Ttl`, `MaxAge`)
//! - The ports the resolution engine consumes (store, cache, secrets, flags)

pub mod traits;
pub mod types;

pub use traits::{ConfigStore, FlagProvider, JsonCache, SecretProvider};
pub use types::{ConfigItem, ConfigSet, ItemKind, ItemValue, MaxAge, ToggleFlag, Ttl};
