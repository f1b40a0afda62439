//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Pipeline orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Soft end-to-end budget for one run, in seconds.
    #[serde(default = "default_run_budget_secs")]
    pub run_budget_secs: u64,
    /// Maximum attempts for a repository operation within a step.
    #[serde(default = "default_max_step_attempts")]
    pub max_step_attempts: u32,
    /// Base delay for exponential retry backoff, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Lease duration for a claimed run, in seconds.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    /// Default page size for run and entry listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_run_budget_secs() -> u64 {
    15
}

fn default_max_step_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    50
}

fn default_claim_ttl_secs() -> u64 {
    60
}

fn default_page_size() -> u32 {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_budget_secs: default_run_budget_secs(),
            max_step_attempts: default_max_step_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            claim_ttl_secs: default_claim_ttl_secs(),
            page_size: default_page_size(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("BOKPILOT").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
