use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all enrichment server metrics
const PREFIX: &str = "salon_enrichment";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Enrichment Metrics
    pub static ref ITEMS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_items_total"), "Salons processed by outcome"),
        &["outcome"]
    ).expect("Failed to create items_total metric");

    pub static ref COST_USD_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_cost_usd_total"), "Estimated provider spend in USD"),
        &["provider"]
    ).expect("Failed to create cost_usd_total metric");

    pub static ref JOB_RUNNING: Gauge = Gauge::new(
        format!("{PREFIX}_job_running"),
        "1 while an enrichment job is running"
    ).expect("Failed to create job_running metric");

    pub static ref PROVIDER_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_provider_errors_total"), "Provider call failures"),
        &["provider", "kind"]
    ).expect("Failed to create provider_errors_total metric");

    // Review Index Metrics
    pub static ref REVIEW_INDEX_SALONS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_review_index_salons"), "Indexed salons per review tier"),
        &["tier"]
    ).expect("Failed to create review_index_salons metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(COST_USD_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(PROVIDER_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REVIEW_INDEX_SALONS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record one processed salon: "enriched", "failed" or "skipped"
pub fn record_item(outcome: &str) {
    ITEMS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_cost(provider: &str, usd: f64) {
    COST_USD_TOTAL.with_label_values(&[provider]).inc_by(usd);
}

pub fn set_job_running(running: bool) {
    JOB_RUNNING.set(if running { 1.0 } else { 0.0 });
}

pub fn record_provider_error(provider: &str, kind: &str) {
    PROVIDER_ERRORS_TOTAL
        .with_label_values(&[provider, kind])
        .inc();
}

/// Publish the per-tier salon counts of a freshly built index
pub fn set_review_index_counts<'a>(counts: impl IntoIterator<Item = (&'a String, &'a usize)>) {
    for (tier, count) in counts {
        REVIEW_INDEX_SALONS
            .with_label_values(&[tier.as_str()])
            .set(*count as f64);
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
