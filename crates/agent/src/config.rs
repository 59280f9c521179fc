//! Agent configuration

use anyhow::{Context, Result};
use health_lib::collector::{CollectionConfig, DEFAULT_SYSCTL_ROOT};
use health_lib::sync::ClientConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "AGENT_CONFIG_FILE";

/// Agent configuration, read from `AGENT_*` variables and an optional file
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Host identity used in logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port for health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Analyzer base URL
    #[serde(default = "default_analyzer_endpoint")]
    pub analyzer_endpoint: String,

    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Upper bound of the random delay before each cycle
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Retries after the first delivery attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-attempt request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Filesystem whose capacity is reported
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    /// Root of the sysctl tree
    #[serde(default = "default_procfs_sys_root")]
    pub procfs_sys_root: PathBuf,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_analyzer_endpoint() -> String {
    "http://health-analyzer:5000".to_string()
}

fn default_collection_interval() -> u64 {
    60
}

fn default_jitter_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_request_timeout() -> u64 {
    10
}

fn default_mount_point() -> PathBuf {
    PathBuf::from("/")
}

fn default_procfs_sys_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSCTL_ROOT)
}

impl AgentConfig {
    /// Load configuration from the environment and the optional config file
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::from_sources(file, config::Environment::with_prefix("AGENT"))
    }

    fn from_sources(file: Option<PathBuf>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config: Self = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read agent configuration")?
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.collection_interval_secs == 0 {
            anyhow::bail!("collection_interval_secs must be greater than zero");
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            anyhow::bail!("initial_backoff_ms must not exceed max_backoff_ms");
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.analyzer_endpoint.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..ClientConfig::default()
        }
    }

    pub fn collection_config(&self) -> CollectionConfig {
        CollectionConfig {
            interval: Duration::from_secs(self.collection_interval_secs),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}
