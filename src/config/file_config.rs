use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,

    // Feature configs
    pub enrichment: Option<EnrichmentConfig>,
    pub providers: Option<ProvidersConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub inter_item_delay_ms: Option<u64>,
    pub freshness_days: Option<u32>,
    pub max_retries: Option<u32>,
    pub priority_city_count: Option<usize>,
    pub places_cost_usd: Option<f64>,
    pub generative_cost_usd: Option<f64>,
    pub persistence_failure_threshold: Option<u32>,
    pub provider_timeout_secs: Option<u64>,
    pub log_capacity: Option<usize>,
    pub duration_window: Option<usize>,
    // Retry backoff
    pub auto_retry_transient: Option<bool>,
    pub initial_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_backoff_ms: Option<u64>,
    pub resume_on_startup: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub places_base_url: Option<String>,
    pub places_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API, e.g. "https://api.openai.com/v1"
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
