use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use salon_enrichment_server::config::{AppConfig, CliConfig, FileConfig};
use salon_enrichment_server::enrichment::{
    EnrichmentWorker, JobManager, ProviderCosts, SqliteJobStore,
};
use salon_enrichment_server::location_store::{
    import_salons_json, LocationStore, SqliteLocationStore,
};
use salon_enrichment_server::providers::{GooglePlacesClient, OpenAiContentGenerator};
use salon_enrichment_server::review_index::ReviewIndexHandle;
use salon_enrichment_server::server::{self, run_server, RequestsLoggingLevel, ServerConfig};
use salon_enrichment_server::ServerState;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI ones.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding locations.db, enrichment_jobs.db and review_index.json.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3011)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Google Places API key.
    #[clap(long)]
    pub places_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API used for content generation.
    #[clap(long)]
    pub llm_base_url: Option<String>,

    /// Model used for content generation.
    #[clap(long)]
    pub llm_model: Option<String>,

    /// API key for the content generation API.
    #[clap(long)]
    pub llm_api_key: Option<String>,

    /// JSON array of salons to upsert into the location store before serving.
    #[clap(long, value_parser = parse_path)]
    pub import: Option<PathBuf>,
}

async fn shutdown_signal(job_manager: Arc<JobManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down, stopping enrichment job...");
    job_manager.shutdown().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        port: cli_args.port,
        logging_level: cli_args.logging_level.clone(),
        places_api_key: cli_args.places_api_key.clone(),
        llm_base_url: cli_args.llm_base_url.clone(),
        llm_model: cli_args.llm_model.clone(),
        llm_api_key: cli_args.llm_api_key.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    info!(
        "Opening locations database at {:?}...",
        config.locations_db_path()
    );
    let location_store: Arc<dyn LocationStore> =
        Arc::new(SqliteLocationStore::new(config.locations_db_path())?);
    if let Some(import_path) = &cli_args.import {
        import_salons_json(location_store.as_ref(), import_path)?;
    }

    let review_index = Arc::new(ReviewIndexHandle::load_or_empty(
        config.review_index_path(),
    )?);
    server::metrics::set_review_index_counts(&review_index.current().stats().tier_counts);

    let Some(places_api_key) = config.providers.places_api_key.clone() else {
        bail!("places_api_key must be specified via --places-api-key or in config file");
    };
    let provider_timeout = Duration::from_secs(config.enrichment.provider_timeout_secs);
    let places = Arc::new(GooglePlacesClient::new(
        config.providers.places_base_url.clone(),
        places_api_key,
        provider_timeout,
    )?);
    info!(
        "Content generation via {} ({})",
        config.providers.llm_base_url, config.providers.llm_model
    );
    let generator = Arc::new(OpenAiContentGenerator::new(
        config.providers.llm_base_url.clone(),
        config.providers.llm_model.clone(),
        config.providers.llm_api_key.clone(),
        provider_timeout,
    ));

    let worker = Arc::new(EnrichmentWorker::new(
        location_store.clone(),
        places,
        generator,
        ProviderCosts {
            places_usd: config.enrichment.places_cost_usd,
            generative_usd: config.enrichment.generative_cost_usd,
        },
        config.enrichment.freshness_days,
    ));
    let job_store = Arc::new(SqliteJobStore::new(config.jobs_db_path())?);
    let job_manager = Arc::new(JobManager::new(
        worker,
        job_store,
        review_index,
        config.enrichment.clone(),
    ));
    job_manager.recover_on_startup().await?;

    let state = ServerState::new(
        ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
        },
        job_manager.clone(),
        location_store,
    );

    info!("Ready to serve at port {}!", config.port);
    run_server(state, shutdown_signal(job_manager)).await
}
