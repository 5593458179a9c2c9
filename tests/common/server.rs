//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own databases, seeded
//! locations and stub upstream providers.

use super::constants::*;
use super::fixtures::seed_locations;
use super::upstream::{spawn_upstream, UpstreamStub};
use salon_enrichment_server::config::EnrichmentSettings;
use salon_enrichment_server::enrichment::{
    EnrichmentWorker, JobManager, ProviderCosts, SqliteJobStore,
};
use salon_enrichment_server::location_store::{LocationStore, SqliteLocationStore};
use salon_enrichment_server::providers::{GooglePlacesClient, OpenAiContentGenerator};
use salon_enrichment_server::review_index::ReviewIndexHandle;
use salon_enrichment_server::server::{make_app, metrics, RequestsLoggingLevel, ServerConfig};
use salon_enrichment_server::ServerState;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Settings tuned for fast tests: no inter-item delay, millisecond backoff
pub fn test_settings() -> EnrichmentSettings {
    EnrichmentSettings {
        inter_item_delay_ms: 0,
        places_cost_usd: PLACES_COST_USD,
        generative_cost_usd: GENERATIVE_COST_USD,
        provider_timeout_secs: 5,
        initial_backoff_ms: 1,
        max_backoff_ms: 10,
        ..Default::default()
    }
}

/// Test server instance with isolated databases
///
/// When dropped, the HTTP server shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Direct access for assertions on persisted salons
    pub location_store: Arc<dyn LocationStore>,

    pub job_manager: Arc<JobManager>,

    /// Stub provider APIs, with call counters
    pub upstream: Arc<UpstreamStub>,

    upstream_url: String,
    settings: EnrichmentSettings,
    db_dir: Option<TempDir>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with seeded locations
    pub async fn spawn() -> Self {
        Self::spawn_with(test_settings()).await
    }

    pub async fn spawn_with(settings: EnrichmentSettings) -> Self {
        let db_dir = TempDir::new().expect("Failed to create temp dir");
        let upstream = Arc::new(UpstreamStub::default());
        let upstream_url = spawn_upstream(upstream.clone()).await;

        let store = SqliteLocationStore::new(db_dir.path().join("locations.db"))
            .expect("Failed to open location store");
        seed_locations(&store).expect("Failed to seed locations");
        drop(store);

        Self::start(db_dir, upstream, upstream_url, settings).await
    }

    /// Simulates a process restart: the running job is stopped as on
    /// shutdown and a fresh server is built over the same databases.
    pub async fn restart(mut self) -> Self {
        self.job_manager.shutdown().await;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let db_dir = self.db_dir.take().expect("db dir already taken");
        Self::start(
            db_dir,
            self.upstream.clone(),
            self.upstream_url.clone(),
            self.settings.clone(),
        )
        .await
    }

    async fn start(
        db_dir: TempDir,
        upstream: Arc<UpstreamStub>,
        upstream_url: String,
        settings: EnrichmentSettings,
    ) -> Self {
        metrics::init_metrics();

        let location_store: Arc<dyn LocationStore> = Arc::new(
            SqliteLocationStore::new(db_dir.path().join("locations.db"))
                .expect("Failed to open location store"),
        );
        let review_index = Arc::new(
            ReviewIndexHandle::load_or_empty(db_dir.path().join("review_index.json"))
                .expect("Failed to load review index"),
        );

        let timeout = Duration::from_secs(settings.provider_timeout_secs);
        let places = Arc::new(
            GooglePlacesClient::new(format!("{}/places", upstream_url), "test-key", timeout)
                .expect("Failed to build places client"),
        );
        let generator = Arc::new(OpenAiContentGenerator::new(
            format!("{}/llm", upstream_url),
            "test-model",
            None,
            timeout,
        ));
        let worker = Arc::new(EnrichmentWorker::new(
            location_store.clone(),
            places,
            generator,
            ProviderCosts {
                places_usd: settings.places_cost_usd,
                generative_usd: settings.generative_cost_usd,
            },
            settings.freshness_days,
        ));
        let job_store = Arc::new(
            SqliteJobStore::new(db_dir.path().join("enrichment_jobs.db"))
                .expect("Failed to open job store"),
        );
        let job_manager = Arc::new(JobManager::new(
            worker,
            job_store,
            review_index,
            settings.clone(),
        ));
        job_manager
            .recover_on_startup()
            .await
            .expect("Failed to recover job");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState::new(
            ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
            },
            job_manager.clone(),
            location_store.clone(),
        );
        let app = make_app(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            location_store,
            job_manager,
            upstream,
            upstream_url,
            settings,
            db_dir: Some(db_dir),
            shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Waits for the server to become ready by polling the status endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
