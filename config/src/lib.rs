//! # Configuration System
//!
//! Configuration of the config store service.
//!
//! This crate provides:
//! - Configuration structures for every collaborator of the engine
//! - Configuration file loading (JSON/TOML/YAML)
//! - Environment variable overrides (12-factor app principles)
//! - Configuration validation
//!
//! # Precedence Order
//! 1. Environment variables (highest priority)
//! 2. Configuration file named by `OLIVE_CONFIG_FILE`
//! 3. Default values (lowest priority)

pub mod config;
pub mod file_loader;
pub mod loader;

pub use config::{
    CacheConfig, CollapseConfig, Config, ObservabilityConfig, RedisConfig, SecretsConfig,
    StoreConfig,
};
pub use file_loader::{ConfigFileError, load_from_file, load_from_json, load_from_toml, load_from_yaml};
pub use loader::{apply_env_overrides, load_from_env};
pub use validator::Validate;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "OLIVE_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "./config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error(transparent)]
    File(#[from] ConfigFileError),

    #[error("Invalid value for {key}: {reason}")]
    InvalidEnv { key: String, reason: String },

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Load the service configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Reads the file named by `OLIVE_CONFIG_FILE` (default `./config.json`),
/// applies environment overrides and validates the result.
///
/// ## Usage
/// ```rust,no_run
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = config::load()?;
///     println!("Redis: {}", config.redis.url());
///     Ok(())
/// }
/// ```
///
/// ## Error Handling
/// A missing file is not an error: it is logged and defaults are used.
/// Parse, environment and validation failures are returned.
pub fn load() -> Result<Config, ConfigLoadError> {
    let path = std::env::var(CONFIG_FILE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
    load_with_file(&path)
}

/// Same as [`load`] with an explicit file path.
pub fn load_with_file(path: &Path) -> Result<Config, ConfigLoadError> {
    let mut config = match load_from_file(path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded configuration file");
            config
        }
        Err(ConfigFileError::FileNotFound(_)) => {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_with_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.collapse.timeout_ms, 500);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"redis": {"host": "from-file", "port": 7000}}"#).unwrap();
        unsafe {
            std::env::set_var("RD_HOST", "from-env");
        }

        let config = load_with_file(&path).unwrap();
        assert_eq!(config.redis.host, "from-env");
        assert_eq!(config.redis.port, 7000);

        unsafe {
            std::env::remove_var("RD_HOST");
        }
    }

    #[test]
    #[serial]
    fn test_invalid_file_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"collapse": {"timeout_ms": 0}}"#).unwrap();

        let result = load_with_file(&path);
        assert!(matches!(result, Err(ConfigLoadError::Validation(_))));
    }

    #[test]
    #[serial]
    fn test_load_reads_path_from_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("olive.yaml");
        fs::write(&path, "collapse:\n  flag_name: collapse_reads\n").unwrap();
        unsafe {
            std::env::set_var(CONFIG_FILE_ENV, &path);
        }

        let config = load().unwrap();
        assert_eq!(config.collapse.flag_name, "collapse_reads");

        unsafe {
            std::env::remove_var(CONFIG_FILE_ENV);
        }
    }
}
