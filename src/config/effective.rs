//! Effective configuration with provenance
//!
//! Records the merged configuration plus where each layer came from.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::timeout::TimeoutValidationError;

use super::defaults::BuiltinDefaults;
use super::merge::{merge_layers, strip_nulls};
use super::settings::DeployConfig;

/// Schema identifier
pub const SCHEMA_ID: &str = "nomad-deploy/effective_config@1";

/// Default config file, relative to `$HOME`
pub const DEFAULT_CONFIG_PATH: &str = ".config/nomad-deploy/config.toml";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing config source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration and its sources
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    /// The merged configuration object
    pub config: Value,
    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
    #[serde(skip)]
    settings: DeployConfig,
}

impl EffectiveConfig {
    /// Merge defaults, an optional TOML file and CLI overrides.
    ///
    /// Null entries in `cli_overrides` are ignored so that unset flags do
    /// not hide file values.
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(strip_nulls(cli));
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let mut merged = merge_layers(layers);
        follow_poll_interval(&mut merged);

        let settings: DeployConfig = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        settings.validate()?;

        tracing::debug!(sources = sources.len(), "configuration merged");

        Ok(Self {
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            settings,
        })
    }

    /// Use `explicit` when given, else the default file when it exists
    pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if explicit.is_some() {
            return explicit;
        }
        let home = std::env::var("HOME").ok()?;
        let path = PathBuf::from(home).join(DEFAULT_CONFIG_PATH);
        path.exists().then_some(path)
    }

    pub fn settings(&self) -> &DeployConfig {
        &self.settings
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }
}

/// An unset backoff cap follows the poll interval
fn follow_poll_interval(merged: &mut Value) {
    let Some(timeouts) = merged.get_mut("timeouts").and_then(Value::as_object_mut) else {
        return;
    };
    if timeouts.contains_key("max_poll_interval_ms") {
        return;
    }
    if let Some(interval) = timeouts.get("poll_interval_ms").cloned() {
        timeouts.insert("max_poll_interval_ms".to_string(), interval);
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let value: Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((value, digest))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Validation error: {0}")]
    Timeout(#[from] TimeoutValidationError),

    #[error("Missing required settings: {0}")]
    MissingFields(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None).unwrap();

        assert_eq!(config.get_str("ssh.key_path"), Some("/id_rsa"));
        assert_eq!(config.get_u64("timeouts.max_poll_interval_ms"), Some(1000));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_cli_override_and_null_passthrough() {
        let cli = json!({"deploy": {"tag": "v7", "task_group": null}, "ssh": {"host": null}});

        let config = EffectiveConfig::build(None, Some(cli)).unwrap();
        assert_eq!(config.settings().deploy.tag, "v7");
        assert_eq!(config.settings().deploy.task_group, None);
        assert_eq!(config.sources.last().unwrap().origin, ConfigOrigin::Cli);
    }

    #[test]
    fn test_max_interval_follows_interval() {
        let cli = json!({"timeouts": {"poll_interval_ms": 5000}});

        let config = EffectiveConfig::build(None, Some(cli)).unwrap();
        assert_eq!(config.settings().timeouts.max_poll_interval_ms, 5000);
    }

    #[test]
    fn test_validation_poll_interval() {
        let cli = json!({"timeouts": {"poll_interval_ms": 0}});

        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn test_validation_connect_timeout() {
        let cli = json!({"timeouts": {"connect_timeout_seconds": 500}});

        let err = EffectiveConfig::build(None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("connect_timeout_seconds"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let cli = json!({"ssh": {"port": "twenty-two"}});
        assert!(matches!(
            EffectiveConfig::build(None, Some(cli)),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_toml_file_layer() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[ssh]").unwrap();
        writeln!(temp, "user = \"deploy\"").unwrap();
        writeln!(temp, "host = \"bastion.example.com\"").unwrap();
        writeln!(temp, "[timeouts]").unwrap();
        writeln!(temp, "allocation_timeout_seconds = 900").unwrap();

        let cli = json!({"ssh": {"user": "ci"}});
        let config = EffectiveConfig::build(Some(temp.path()), Some(cli)).unwrap();

        assert_eq!(config.settings().ssh.user, "ci");
        assert_eq!(config.settings().ssh.host, "bastion.example.com");
        assert_eq!(config.settings().timeouts.allocation_timeout_seconds, Some(900));

        let file = &config.sources[1];
        assert_eq!(file.origin, ConfigOrigin::File);
        assert_eq!(file.digest.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_file_sets_one_version_var() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[deploy.version_env]").unwrap();
        writeln!(temp, "version_var = \"APP_VERSION\"").unwrap();

        let config = EffectiveConfig::build(Some(temp.path()), None).unwrap();
        let env = &config.settings().deploy.version_env;

        assert_eq!(env.version_var, "APP_VERSION");
        assert_eq!(env.release_var, "RELEASE_VERSION");
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = EffectiveConfig::build(Some(Path::new("/nonexistent/nomad-deploy.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(EffectiveConfig::resolve_path(Some(explicit.clone())), Some(explicit));
    }

    #[test]
    fn test_to_json_includes_sources() {
        let config = EffectiveConfig::build(None, None).unwrap();
        let json = config.to_json().unwrap();

        assert!(json.contains(SCHEMA_ID));
        assert!(json.contains("\"builtin\""));
    }
}
