mod file_config;

pub use file_config::{EnrichmentConfig, FileConfig, ProvidersConfig};

use crate::providers::GOOGLE_PLACES_API_BASE;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub places_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Feature configs (with defaults)
    pub enrichment: EnrichmentSettings,
    pub providers: ProviderSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let defaults = EnrichmentSettings::default();
        let en_file = file.enrichment.unwrap_or_default();
        let enrichment = EnrichmentSettings {
            inter_item_delay_ms: en_file
                .inter_item_delay_ms
                .unwrap_or(defaults.inter_item_delay_ms),
            freshness_days: en_file.freshness_days.unwrap_or(defaults.freshness_days),
            max_retries: en_file.max_retries.unwrap_or(defaults.max_retries),
            priority_city_count: en_file
                .priority_city_count
                .unwrap_or(defaults.priority_city_count),
            places_cost_usd: en_file.places_cost_usd.unwrap_or(defaults.places_cost_usd),
            generative_cost_usd: en_file
                .generative_cost_usd
                .unwrap_or(defaults.generative_cost_usd),
            persistence_failure_threshold: en_file
                .persistence_failure_threshold
                .unwrap_or(defaults.persistence_failure_threshold),
            provider_timeout_secs: en_file
                .provider_timeout_secs
                .unwrap_or(defaults.provider_timeout_secs),
            log_capacity: en_file.log_capacity.unwrap_or(defaults.log_capacity),
            duration_window: en_file.duration_window.unwrap_or(defaults.duration_window),
            auto_retry_transient: en_file
                .auto_retry_transient
                .unwrap_or(defaults.auto_retry_transient),
            initial_backoff_ms: en_file
                .initial_backoff_ms
                .unwrap_or(defaults.initial_backoff_ms),
            backoff_multiplier: en_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            max_backoff_ms: en_file.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            resume_on_startup: en_file
                .resume_on_startup
                .unwrap_or(defaults.resume_on_startup),
        };
        if enrichment.priority_city_count == 0 {
            bail!("enrichment.priority_city_count must be at least 1");
        }
        if enrichment.backoff_multiplier < 1.0 {
            bail!("enrichment.backoff_multiplier must be >= 1.0");
        }

        let pr_file = file.providers.unwrap_or_default();
        let providers = ProviderSettings {
            places_base_url: pr_file
                .places_base_url
                .unwrap_or_else(|| GOOGLE_PLACES_API_BASE.to_string()),
            places_api_key: pr_file
                .places_api_key
                .or_else(|| cli.places_api_key.clone()),
            llm_base_url: pr_file
                .llm_base_url
                .or_else(|| cli.llm_base_url.clone())
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: pr_file
                .llm_model
                .or_else(|| cli.llm_model.clone())
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_api_key: pr_file.llm_api_key.or_else(|| cli.llm_api_key.clone()),
        };

        Ok(Self {
            db_dir,
            port,
            logging_level,
            enrichment,
            providers,
        })
    }

    pub fn locations_db_path(&self) -> PathBuf {
        self.db_dir.join("locations.db")
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("enrichment_jobs.db")
    }

    pub fn review_index_path(&self) -> PathBuf {
        self.db_dir.join("review_index.json")
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    /// Pause between two processed salons.
    pub inter_item_delay_ms: u64,
    pub freshness_days: u32,
    pub max_retries: u32,
    /// Number of cities a filtered run covers when no city limit is given.
    pub priority_city_count: usize,
    pub places_cost_usd: f64,
    pub generative_cost_usd: f64,
    pub persistence_failure_threshold: u32,
    pub provider_timeout_secs: u64,
    pub log_capacity: usize,
    pub duration_window: usize,
    // Retry backoff
    pub auto_retry_transient: bool,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub resume_on_startup: bool,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 4000,
            freshness_days: 30,
            max_retries: 3,
            priority_city_count: 50,
            places_cost_usd: 0.017,
            generative_cost_usd: 0.013,
            persistence_failure_threshold: 3,
            provider_timeout_secs: 30,
            log_capacity: 100,
            duration_window: 20,
            auto_retry_transient: true,
            initial_backoff_ms: 2000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 60_000,
            resume_on_startup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub places_base_url: String,
    pub places_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
