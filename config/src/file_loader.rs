//! # Configuration File Loading
//!
//! Loads configuration from JSON, TOML or YAML files.
//!
//! Supports automatic format detection based on file extension.

use crate::config::Config;
use std::path::Path;

/// Configuration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),
}

fn read(path: &Path) -> Result<String, ConfigFileError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigFileError::FileNotFound(path.display().to_string()),
        _ => ConfigFileError::Io(e),
    })
}

/// Load configuration from a JSON file, the format the service has always
/// shipped with (`config.json`).
pub fn load_from_json(path: &Path) -> Result<Config, ConfigFileError> {
    let contents = read(path)?;
    serde_json::from_str(&contents).map_err(|e| ConfigFileError::JsonParse(e.to_string()))
}

pub fn load_from_toml(path: &Path) -> Result<Config, ConfigFileError> {
    let contents = read(path)?;
    toml::from_str(&contents).map_err(|e| ConfigFileError::TomlParse(e.to_string()))
}

pub fn load_from_yaml(path: &Path) -> Result<Config, ConfigFileError> {
    let contents = read(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))
}

/// Load configuration from file with auto-detection.
///
/// # M-CANONICAL-DOCS
///
/// ## Supported Formats
/// - `.json`: JSON format
/// - `.toml`: TOML format
/// - `.yaml` / `.yml`: YAML format
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_file;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_file(Path::new("config.json"))?;
///     println!("collapse timeout: {}ms", config.collapse.timeout_ms);
///     Ok(())
/// }
/// ```
///
/// ## Error Handling
/// Returns `ConfigFileError` for a missing file, an unknown extension or a
/// parse error of the detected format.
pub fn load_from_file(path: &Path) -> Result<Config, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    match extension.to_lowercase().as_str() {
        "json" => load_from_json(path),
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretsConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "redis": {"host": "redishost", "port": 6380, "db": 2},
                "cache": {"ttl_seconds": 60},
                "collapse": {"timeout_ms": 750}
            }"#,
        )
        .unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.redis.host, "redishost");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.redis.db, 2);
        assert_eq!(config.cache.ttl_seconds, Some(60));
        assert_eq!(config.collapse.timeout_ms, 750);
        assert_eq!(config.collapse.flag_name, "single_flight_on");
    }

    #[test]
    fn test_load_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[redis]
host = "redishost"

[secrets]
provider = "vault"
address = "http://vault:8200"
token = "root"

[observability]
logging_level = "debug"
"#,
        )
        .unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.redis.host, "redishost");
        assert_eq!(config.observability.logging_level, "debug");
        assert!(matches!(
            config.secrets,
            SecretsConfig::Vault { ref mount_path, .. } if mount_path == "secret"
        ));
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            r#"
store:
  cas_max_retries: 4
secrets:
  provider: aws-secrets-manager
  region: eu-central-1
"#,
        )
        .unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.store.cas_max_retries, 4);
        assert!(matches!(
            config.secrets,
            SecretsConfig::Aws { ref region, .. } if region == "eu-central-1"
        ));
    }

    #[test]
    fn test_load_from_file_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "").unwrap();

        let result = load_from_file(&path);
        assert!(matches!(result, Err(ConfigFileError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_from_file_no_extension() {
        let result = load_from_file(Path::new("config"));
        assert!(matches!(result, Err(ConfigFileError::NoExtension)));
    }

    #[test]
    fn test_load_from_file_missing() {
        let dir = TempDir::new().unwrap();
        let result = load_from_file(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigFileError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let result = load_from_file(&path);
        assert!(matches!(result, Err(ConfigFileError::JsonParse(_))));
    }
}
