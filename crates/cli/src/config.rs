//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ANALYZER_URL: &str = "http://localhost:5000";

/// Optional settings from `~/.config/hh/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Analyzer base URL
    pub analyzer_url: Option<String>,
    /// Filesystem sampled by `collect` and `push`
    pub mount_point: Option<String>,
    /// Retries used by `push`
    pub max_retries: Option<u32>,
}

impl Config {
    /// Load the user config, or defaults when none exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Flag or env value first, then the file, then the built-in default
    pub fn analyzer_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.analyzer_url.clone())
            .unwrap_or_else(|| DEFAULT_ANALYZER_URL.to_string())
    }

    pub fn mount_point(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.mount_point.clone())
            .unwrap_or_else(|| "/".to_string())
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("hh").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();

        assert_eq!(config.analyzer_url(None), DEFAULT_ANALYZER_URL);
        assert_eq!(config.mount_point(None), "/");
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn test_flag_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"analyzer_url": "http://analyzer.internal:5000", "mount_point": "/data"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.analyzer_url(None), "http://analyzer.internal:5000");
        assert_eq!(
            config.analyzer_url(Some("http://localhost:9000".to_string())),
            "http://localhost:9000"
        );
        assert_eq!(config.mount_point(None), "/data");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
