use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub degrees: DegreesConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DegreesConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Graph provider configuration (TMDb-shaped credits API)
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    pub api_key_env: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

/// Task dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// "local" queues tasks in the service's own database; "http" pushes
    /// each task to a remote relaxation endpoint.
    #[serde(default = "default_dispatcher_mode")]
    pub mode: String,
    /// Base URL of the relaxation endpoint, required in "http" mode.
    #[serde(default)]
    pub relax_endpoint: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: default_dispatcher_mode(),
            relax_endpoint: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_secs: default_lease_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_provider_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_dispatcher_mode() -> String {
    "local".to_string()
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_lease_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    10
}

fn default_http_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    // Default empty — set allowed_origins in config.toml for production
    vec![]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in DEGREES_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("DEGREES_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        // Validate the provider base URL up front so a typo fails at startup
        // rather than on the first expansion
        url::Url::parse(&self.provider.base_url).with_context(|| {
            format!("provider.base_url is not a valid URL: {}", self.provider.base_url)
        })?;

        // Check both environment variable and .env file (dotenv already loaded in Config::load)
        std::env::var(&self.provider.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your provider API key.",
                self.provider.api_key_env
            )
        })?;

        match self.dispatcher.mode.as_str() {
            "local" => {}
            "http" => {
                if self.dispatcher.relax_endpoint.is_empty() {
                    anyhow::bail!(
                        "dispatcher.relax_endpoint must be set when dispatcher.mode is \"http\""
                    );
                }
                url::Url::parse(&self.dispatcher.relax_endpoint).with_context(|| {
                    format!(
                        "dispatcher.relax_endpoint is not a valid URL: {}",
                        self.dispatcher.relax_endpoint
                    )
                })?;
            }
            other => anyhow::bail!(
                "dispatcher.mode must be \"local\" or \"http\", got \"{}\"",
                other
            ),
        }

        if self.dispatcher.batch_size == 0 {
            anyhow::bail!("dispatcher.batch_size must be greater than 0");
        }

        if self.dispatcher.lease_secs == 0 {
            anyhow::bail!("dispatcher.lease_secs must be greater than 0");
        }

        if self.dispatcher.max_attempts == 0 {
            anyhow::bail!("dispatcher.max_attempts must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.degrees.db_path
    }
}
