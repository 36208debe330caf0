//! Runtime configuration and its on-disk JSON form
//!
//! The per-level scatter-gather deadlines are the only tunables of the
//! registry hierarchy. Each level must wait longer than the level below it,
//! otherwise nested aggregation would always time out.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{Result, RuntimeError};

/// Configuration for the iotree runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Root path segment under which every entity is addressed
    pub name: String,

    /// Deadline for a group-level scatter-gather, in milliseconds
    pub group_query_timeout_ms: u64,

    /// Deadline for a manager-level scatter-gather, in milliseconds
    pub manager_query_timeout_ms: u64,

    /// Deadline for a supervisor-level scatter-gather, in milliseconds
    pub supervisor_query_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "iot".to_string(),
            group_query_timeout_ms: 3_000,
            manager_query_timeout_ms: 30_000,
            supervisor_query_timeout_ms: 60_000,
        }
    }
}

impl RuntimeConfig {
    /// Deadline for group-level queries
    pub fn group_query_timeout(&self) -> Duration {
        Duration::from_millis(self.group_query_timeout_ms)
    }

    /// Deadline for manager-level queries
    pub fn manager_query_timeout(&self) -> Duration {
        Duration::from_millis(self.manager_query_timeout_ms)
    }

    /// Deadline for supervisor-level queries
    pub fn supervisor_query_timeout(&self) -> Duration {
        Duration::from_millis(self.supervisor_query_timeout_ms)
    }

    /// Check the configuration for values the hierarchy cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(RuntimeError::Config(format!(
                "name must be a non-empty path segment, got {:?}",
                self.name
            )));
        }

        if self.group_query_timeout_ms == 0 {
            return Err(RuntimeError::Config(
                "group_query_timeout_ms must be non-zero".to_string(),
            ));
        }

        if self.manager_query_timeout_ms <= self.group_query_timeout_ms {
            return Err(RuntimeError::Config(format!(
                "manager_query_timeout_ms ({}) must exceed group_query_timeout_ms ({})",
                self.manager_query_timeout_ms, self.group_query_timeout_ms
            )));
        }

        if self.supervisor_query_timeout_ms <= self.manager_query_timeout_ms {
            return Err(RuntimeError::Config(format!(
                "supervisor_query_timeout_ms ({}) must exceed manager_query_timeout_ms ({})",
                self.supervisor_query_timeout_ms, self.manager_query_timeout_ms
            )));
        }

        Ok(())
    }
}

/// Write a configuration to `path` as pretty-printed JSON
pub fn write_config(path: &Path, config: &RuntimeConfig) -> Result<()> {
    config.validate()?;
    let json = serde_json::to_vec_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| RuntimeError::ConfigFile {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, json).map_err(|source| RuntimeError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate a configuration from `path`
///
/// Missing fields take their default values.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let data = std::fs::read(path).map_err(|source| RuntimeError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })?;

    let config: RuntimeConfig = serde_json::from_slice(&data)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.group_query_timeout(), Duration::from_secs(3));
        assert_eq!(config.manager_query_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_manager_timeout_must_exceed_group_timeout() {
        let config = RuntimeConfig {
            manager_query_timeout_ms: 3_000,
            ..RuntimeConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn test_name_rejects_slashes() {
        let config = RuntimeConfig {
            name: "a/b".to_string(),
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_and_load_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("iotree.json");

        let config = RuntimeConfig {
            name: "plant".to_string(),
            group_query_timeout_ms: 500,
            manager_query_timeout_ms: 2_000,
            supervisor_query_timeout_ms: 4_000,
        };

        write_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("iotree.json");
        std::fs::write(&path, br#"{ "name": "lab" }"#).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.name, "lab");
        assert_eq!(loaded.group_query_timeout_ms, 3_000);
    }

    #[test]
    fn test_missing_config_file() {
        let temp = TempDir::new().unwrap();
        let err = load_config(&temp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, RuntimeError::ConfigFile { .. }));
    }
}
