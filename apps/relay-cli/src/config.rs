//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/relayfile/relay.toml`
//! - Windows: `%APPDATA%/relayfile/relay.toml`

use std::path::{Path, PathBuf};

use relayfile_workflow::WorkflowConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Transfer and workflow tuning.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default), writing
    /// the defaults there if the file does not exist yet.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("relayfile")
            .join("relay.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("relayfile").join("relay.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/relayfile/relay.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayfile_workflow::ThumbnailPolicy;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.workflow.concurrency, 20);
    }

    #[test]
    fn partial_toml() {
        let toml_str = r#"
            log_level = "debug"

            [workflow]
            chunk_size = 1048576
            thumbnail_policy = "saved"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.workflow.chunk_size, 1_048_576);
        assert_eq!(config.workflow.thumbnail_policy, ThumbnailPolicy::Saved);
        assert_eq!(config.workflow.concurrency, 20);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.workflow, WorkflowConfig::default());
    }

    #[test]
    fn load_writes_defaults_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("relay.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.log_level, "info");

        let mut changed = config.clone();
        changed.workflow.concurrency = 5;
        changed.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.workflow.concurrency, 5);
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path().unwrap();
        assert!(path.to_string_lossy().contains("relayfile"));
    }
}
