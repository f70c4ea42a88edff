//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{LockError, Result};
use crate::store::DynamoDbSettings;
use std::path::Path;
use std::time::Duration;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "tablelock.yaml";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load an explicitly named file, or `tablelock.yaml` from `dir` if it
    /// exists, or fall back to defaults.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "loading config");
            Self::load(candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::UserError(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `default_ttl_seconds` must be positive
    /// - `table_name`, `key_attribute` and `lock_dir` must be non-empty
    /// - `owner`, when set, must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_seconds == 0 {
            return Err(LockError::UserError(
                "config validation failed: default_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        for (field, value) in [
            ("table_name", &self.table_name),
            ("key_attribute", &self.key_attribute),
            ("lock_dir", &self.lock_dir),
        ] {
            if value.trim().is_empty() {
                return Err(LockError::UserError(format!(
                    "config validation failed: {} must not be empty",
                    field
                )));
            }
        }

        if let Some(owner) = &self.owner
            && owner.trim().is_empty()
        {
            return Err(LockError::UserError(
                "config validation failed: owner must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Owner identity to act as.
    ///
    /// Defaults to `user@HOST`, which stays the same across invocations so a
    /// later `release` or `renew` from the same user and host still matches.
    pub fn owner(&self) -> String {
        self.owner
            .clone()
            .unwrap_or_else(crate::identity::user_at_host)
    }

    /// DynamoDB connection settings derived from this config.
    pub fn dynamodb_settings(&self) -> DynamoDbSettings {
        DynamoDbSettings {
            table_name: self.table_name.clone(),
            key_attribute: self.key_attribute.clone(),
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
        }
    }
}
