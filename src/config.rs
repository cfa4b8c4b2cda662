//! Configuration management for the call limiter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{LimiterError, Result};
use crate::ratelimit::DEFAULT_DATABASE_NAME;

/// Prefix of environment variables overriding configuration values, e.g.
/// `CALL_LIMITER__LIMITS__KEY=tenant-a`.
pub const ENV_PREFIX: &str = "CALL_LIMITER";

/// Main configuration for a limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Defaults applied to calls that leave a parameter unset
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Where the invocation log is kept
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Default limitations, key and exemption.
///
/// A value that is not a string is ignored, leaving the parameter unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Rule string, e.g. `"10/minute;100/day"`
    #[serde(default, deserialize_with = "string_or_ignore")]
    pub limitations: Option<String>,

    /// Key calls are counted under
    #[serde(default, deserialize_with = "string_or_ignore")]
    pub key: Option<String>,

    /// Key value for which calls bypass throttling
    #[serde(default, deserialize_with = "string_or_ignore")]
    pub exempt: Option<String>,
}

/// Invocation log storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory of the file store
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Identifier of the shared log document
    #[serde(default = "default_database_name")]
    pub database_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: None,
            database_name: default_database_name(),
        }
    }
}

/// Invocation log storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Private to the process
    #[default]
    Memory,
    /// Shared through a directory of JSON documents
    File,
}

fn default_database_name() -> String {
    DEFAULT_DATABASE_NAME.to_string()
}

fn string_or_ignore<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(value) => Ok(Some(value)),
        serde_yaml::Value::Null => Ok(None),
        other => {
            warn!(value = ?other, "Ignoring non-string limit setting");
            Ok(None)
        }
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse limiter config: {}", e)))
    }

    /// Load configuration from an optional YAML file, overridden by
    /// `CALL_LIMITER__*` environment variables.
    ///
    /// The file is read as YAML whatever its extension.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder =
                builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LimiterError::Config(e.to_string()))
    }

    /// Check that the storage section is usable.
    pub fn validate(&self) -> Result<()> {
        if self.storage.database_name.is_empty() {
            return Err(LimiterError::Config(
                "storage.database_name must not be empty".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::File && self.storage.path.is_none() {
            return Err(LimiterError::Config(
                "storage.path is required for the file backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LimiterConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.database_name, "call-limiter");
        assert!(config.limits.limitations.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limits:
  limitations: "10/minute;100/day"
  key: tenant-a
  exempt: admin
storage:
  backend: file
  path: /var/lib/call-limiter
  database_name: api-calls
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.limits.limitations.as_deref(), Some("10/minute;100/day"));
        assert_eq!(config.limits.key.as_deref(), Some("tenant-a"));
        assert_eq!(config.limits.exempt.as_deref(), Some("admin"));
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.database_name, "api-calls");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_string_limit_is_ignored() {
        let yaml = r#"
limits:
  limitations: 0
  key: tenant-a
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();

        assert!(config.limits.limitations.is_none());
        assert_eq!(config.limits.key.as_deref(), Some("tenant-a"));
    }

    #[test]
    fn test_file_backend_requires_path() {
        let yaml = r#"
storage:
  backend: file
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(LimiterError::Config(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            LimiterConfig::from_yaml("storage: [unclosed"),
            Err(LimiterError::Config(_))
        ));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = LimiterConfig::load(None).unwrap();
        assert!(!config.storage.database_name.is_empty());
    }

    fn write_temp_config(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("call-limiter-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    const FILE_CONFIG: &str = r#"
limits:
  limitations: [1, 2]
  key: tenant
storage:
  database_name: from-file
"#;

    #[test]
    fn test_load_yaml_file() {
        let path = write_temp_config("limiter.yaml", FILE_CONFIG);

        let config = LimiterConfig::load(Some(&path)).unwrap();

        assert!(config.limits.limitations.is_none());
        assert_eq!(config.limits.key.as_deref(), Some("tenant"));
        assert_eq!(config.storage.database_name, "from-file");

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_load_reads_any_extension_as_yaml() {
        let path = write_temp_config("limiter.conf", FILE_CONFIG);

        let loaded = LimiterConfig::load(Some(&path)).unwrap();
        let direct = LimiterConfig::from_file(&path).unwrap();

        assert_eq!(loaded.storage.database_name, "from-file");
        assert_eq!(direct.storage.database_name, "from-file");
        assert_eq!(direct.limits.key.as_deref(), Some("tenant"));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = std::env::temp_dir().join(format!("missing-{}.yaml", uuid::Uuid::new_v4()));
        assert!(matches!(
            LimiterConfig::load(Some(&path)),
            Err(LimiterError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        // only this test sets the variable; other tests never assert on `exempt`
        std::env::set_var("CALL_LIMITER__LIMITS__EXEMPT", "env-admin");
        let path = write_temp_config("limiter.yaml", "limits:\n  exempt: file-admin\n");

        let config = LimiterConfig::load(Some(&path));
        std::env::remove_var("CALL_LIMITER__LIMITS__EXEMPT");

        assert_eq!(config.unwrap().limits.exempt.as_deref(), Some("env-admin"));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
