//! Enrichment admin HTTP routes.
//!
//! Provides endpoints for:
//! - Browsing the state -> city -> salon hierarchy
//! - Starting, pausing, resuming, retrying and resetting the enrichment job
//! - Polling progress
//! - Rebuilding and inspecting the review index

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::enrichment::JobError;
use crate::review_index::{IndexRebuildError, IndexStats, ReviewTier};
use crate::selection::RawSelectionRequest;
use crate::server::metrics;
use crate::server::state::{
    GuardedJobManager, GuardedLocationStore, GuardedReviewIndex, ServerState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StartExplicitBody {
    pub place_ids: Vec<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForceRetryBody {
    pub place_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SalonsQuery {
    /// Only salons meeting this review tier, e.g. "100+"
    pub tier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewIndexStatsResponse {
    pub rebuilding: bool,
    pub stats: IndexStats,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn job_error_response(e: JobError) -> Response {
    let status = match &e {
        JobError::Validation(_) => StatusCode::BAD_REQUEST,
        JobError::AlreadyRunning
        | JobError::NotRunning
        | JobError::NothingToResume
        | JobError::NothingToRetry => StatusCode::CONFLICT,
        JobError::Store(_) => {
            warn!("Enrichment job store error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.to_string())
}

// =============================================================================
// Location hierarchy
// =============================================================================

/// GET /states - States with their salon counts
async fn get_states(State(store): State<GuardedLocationStore>) -> impl IntoResponse {
    match store.list_states() {
        Ok(states) => Json(states).into_response(),
        Err(e) => {
            warn!("Failed to list states: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list states")
        }
    }
}

/// GET /states/{state}/cities
async fn get_cities(
    State(store): State<GuardedLocationStore>,
    Path(state): Path<String>,
) -> impl IntoResponse {
    match store.list_cities(&state) {
        Ok(cities) => Json(cities).into_response(),
        Err(e) => {
            warn!("Failed to list cities of {}: {:#}", state, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list cities")
        }
    }
}

/// GET /states/{state}/cities/{city}/salons
async fn get_salons(
    State(store): State<GuardedLocationStore>,
    Path((state, city)): Path<(String, String)>,
    Query(query): Query<SalonsQuery>,
) -> impl IntoResponse {
    let tier = match query.tier.as_deref().map(ReviewTier::parse) {
        None => ReviewTier::All,
        Some(Some(tier)) => tier,
        Some(None) => {
            return error_response(StatusCode::BAD_REQUEST, "Unknown review tier");
        }
    };

    match store.list_salons(&state, &city) {
        Ok(mut salons) => {
            salons.retain(|s| s.review_count >= tier.threshold());
            salons.sort_by(|a, b| b.review_count.cmp(&a.review_count));
            Json(salons).into_response()
        }
        Err(e) => {
            warn!("Failed to list salons of {}, {}: {:#}", city, state, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list salons")
        }
    }
}

// =============================================================================
// Job control
// =============================================================================

/// GET /progress - Latest snapshot, never blocks on the running job
async fn get_progress(State(manager): State<GuardedJobManager>) -> impl IntoResponse {
    Json((*manager.progress()).clone())
}

/// POST /start - Strategy-driven run
async fn start(
    State(manager): State<GuardedJobManager>,
    Json(body): Json<RawSelectionRequest>,
) -> Response {
    let request = match body.validate() {
        Ok(request) => request,
        Err(e) => return job_error_response(e.into()),
    };
    match manager.start_filtered(request).await {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// POST /start-explicit - Run over caller-supplied place ids
async fn start_explicit(
    State(manager): State<GuardedJobManager>,
    Json(body): Json<StartExplicitBody>,
) -> Response {
    match manager
        .start_explicit(body.place_ids, body.force_refresh)
        .await
    {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn pause(State(manager): State<GuardedJobManager>) -> Response {
    match manager.pause().await {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn resume(State(manager): State<GuardedJobManager>) -> Response {
    match manager.resume().await {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// POST /retry-failed - Requeue failures still under the retry cap
async fn retry_failed(State(manager): State<GuardedJobManager>) -> Response {
    match manager.retry_failed().await {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// POST /force-retry - Requeue specific failures regardless of the cap
async fn force_retry(
    State(manager): State<GuardedJobManager>,
    Json(body): Json<ForceRetryBody>,
) -> Response {
    match manager.force_retry(body.place_ids).await {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(e) => job_error_response(e),
    }
}

async fn reset(State(manager): State<GuardedJobManager>) -> Response {
    match manager.reset().await {
        Ok(snapshot) => Json((*snapshot).clone()).into_response(),
        Err(e) => job_error_response(e),
    }
}

// =============================================================================
// Review index
// =============================================================================

/// POST /review-index/rebuild
async fn rebuild_review_index(
    State(index): State<GuardedReviewIndex>,
    State(store): State<GuardedLocationStore>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || index.regenerate(store.as_ref())).await;

    match result {
        Ok(Ok(stats)) => {
            info!(
                "Review index rebuilt: {} salons in {} cities ({:.2}s)",
                stats.total_salons, stats.cities_included, stats.processing_time_seconds
            );
            metrics::set_review_index_counts(&stats.tier_counts);
            Json(stats).into_response()
        }
        Ok(Err(IndexRebuildError::InProgress)) => error_response(
            StatusCode::CONFLICT,
            IndexRebuildError::InProgress.to_string(),
        ),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        Err(e) => {
            warn!("Review index rebuild task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Rebuild task failed")
        }
    }
}

/// GET /review-index/stats
async fn get_review_index_stats(State(index): State<GuardedReviewIndex>) -> impl IntoResponse {
    Json(ReviewIndexStatsResponse {
        rebuilding: index.is_rebuilding(),
        stats: index.current().stats().clone(),
    })
}

pub fn admin_routes() -> Router<ServerState> {
    Router::new()
        .route("/states", get(get_states))
        .route("/states/{state}/cities", get(get_cities))
        .route("/states/{state}/cities/{city}/salons", get(get_salons))
        .route("/progress", get(get_progress))
        .route("/start", post(start))
        .route("/start-explicit", post(start_explicit))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/retry-failed", post(retry_failed))
        .route("/force-retry", post(force_retry))
        .route("/reset", post(reset))
        .route("/review-index/rebuild", post(rebuild_review_index))
        .route("/review-index/stats", get(get_review_index_stats))
}
