use anyhow::{Context, Result};
use fedl_registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Only `memory` is supported; state survives restarts through the snapshot file
    pub backend: String,
    /// Relative paths resolve against `node.data_dir`
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`
    pub format: String,
    #[serde(default)]
    pub file_output: Option<PathBuf>,
    #[serde(default)]
    pub module_filters: BTreeMap<String, String>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "fedl-node".to_string(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            snapshot_path: PathBuf::from("ledger-snapshot.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        // Env overrides are applied by the caller so it controls precedence
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = env::var("FEDL_DATA_DIR") {
            if !data_dir.is_empty() {
                self.node.data_dir = PathBuf::from(data_dir);
            }
        }
        if let Ok(snapshot) = env::var("FEDL_SNAPSHOT_PATH") {
            if !snapshot.is_empty() {
                self.storage.snapshot_path = PathBuf::from(snapshot);
            }
        }

        if let Ok(level) = env::var("FEDL_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("FEDL_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }

        if let Ok(max) = env::var("FEDL_MAX_BATCH_TUPLES") {
            if let Ok(val) = max.parse() {
                self.registry.max_batch_tuples = val;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.backend != "memory" {
            anyhow::bail!("unsupported storage backend {:?}", self.storage.backend);
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            anyhow::bail!("unknown log format {:?}", self.logging.format);
        }
        self.registry
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid [registry] section: {}", e))?;
        Ok(())
    }

    pub fn snapshot_file(&self) -> PathBuf {
        if self.storage.snapshot_path.is_absolute() {
            self.storage.snapshot_path.clone()
        } else {
            self.node.data_dir.join(&self.storage.snapshot_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        env::set_var("FEDL_DATA_DIR", "/test/data");
        env::set_var("FEDL_LOG_LEVEL", "debug");
        env::set_var("FEDL_LOG_FORMAT", "json");
        env::set_var("FEDL_MAX_BATCH_TUPLES", "25");
        env::set_var("FEDL_SNAPSHOT_PATH", "state.json");

        let mut config = NodeConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.node.data_dir, PathBuf::from("/test/data"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.registry.max_batch_tuples, 25);
        assert_eq!(config.snapshot_file(), PathBuf::from("/test/data/state.json"));

        env::remove_var("FEDL_DATA_DIR");
        env::remove_var("FEDL_LOG_LEVEL");
        env::remove_var("FEDL_LOG_FORMAT");
        env::remove_var("FEDL_MAX_BATCH_TUPLES");
        env::remove_var("FEDL_SNAPSHOT_PATH");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [node]
            name = "hospital-a"
            data_dir = "/var/lib/fedl"

            [registry]
            max_in_models = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.node.name, "hospital-a");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.registry.max_in_models, 8);
        assert_eq!(config.registry.max_batch_tuples, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = NodeConfig::default();
        config.storage.backend = "rocksdb".into();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.registry.max_batch_tuples = 0;
        assert!(config.validate().is_err());
    }
}
