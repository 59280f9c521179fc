//! Analyzer configuration

use anyhow::{Context, Result};
use health_lib::analysis::{AnalysisConfig, DEFAULT_MAX_CONCURRENT_CLASSIFICATIONS};
use health_lib::predictor::{Model, OnnxModel, RuleModel};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "ANALYZER_CONFIG_FILE";

/// Analyzer configuration, read from `ANALYZER_*` variables and an optional file
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Instance name used in logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// SQLite database file for analysis records
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// ONNX model artifact; the rule model is used when unset
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Expected hex SHA-256 of the model artifact
    #[serde(default)]
    pub model_sha256: Option<String>,

    #[serde(default = "default_classifier_timeout")]
    pub classifier_timeout_ms: u64,

    /// Model invocations allowed to occupy blocking threads at once
    #[serde(default = "default_max_concurrent_classifications")]
    pub max_concurrent_classifications: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "health-analyzer".to_string())
}

fn default_listen_port() -> u16 {
    5000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("health-records.db")
}

fn default_classifier_timeout() -> u64 {
    2000
}

fn default_max_concurrent_classifications() -> usize {
    DEFAULT_MAX_CONCURRENT_CLASSIFICATIONS
}

impl AnalyzerConfig {
    /// Load configuration from the environment and the optional config file
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::from_sources(file, config::Environment::with_prefix("ANALYZER"))
    }

    fn from_sources(file: Option<PathBuf>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config: Self = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read analyzer configuration")?
            .try_deserialize()
            .context("Invalid analyzer configuration")?;

        if config.classifier_timeout_ms == 0 {
            anyhow::bail!("classifier_timeout_ms must be greater than zero");
        }
        if config.max_concurrent_classifications == 0 {
            anyhow::bail!("max_concurrent_classifications must be greater than zero");
        }
        if config.model_sha256.is_some() && config.model_path.is_none() {
            anyhow::bail!("model_sha256 is set but model_path is not");
        }
        Ok(config)
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            classifier_timeout: Duration::from_millis(self.classifier_timeout_ms),
            max_concurrent_classifications: self.max_concurrent_classifications,
        }
    }

    /// Load the configured model, falling back to the rule model
    pub fn model(&self) -> Result<Arc<dyn Model>> {
        match &self.model_path {
            Some(path) => {
                let model = OnnxModel::load(path, self.model_sha256.as_deref())
                    .with_context(|| format!("Failed to load model {}", path.display()))?;
                Ok(Arc::new(model))
            }
            None => Ok(Arc::new(RuleModel::new())),
        }
    }
}
