use axum::extract::FromRef;

use crate::enrichment::JobManager;
use crate::location_store::LocationStore;
use crate::review_index::ReviewIndexHandle;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedJobManager = Arc<JobManager>;
pub type GuardedLocationStore = Arc<dyn LocationStore>;
pub type GuardedReviewIndex = Arc<ReviewIndexHandle>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub job_manager: GuardedJobManager,
    pub location_store: GuardedLocationStore,
    pub review_index: GuardedReviewIndex,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        job_manager: GuardedJobManager,
        location_store: GuardedLocationStore,
    ) -> Self {
        let review_index = job_manager.index().clone();
        Self {
            config,
            start_time: Instant::now(),
            job_manager,
            location_store,
            review_index,
        }
    }
}

impl FromRef<ServerState> for GuardedJobManager {
    fn from_ref(input: &ServerState) -> Self {
        input.job_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedLocationStore {
    fn from_ref(input: &ServerState) -> Self {
        input.location_store.clone()
    }
}

impl FromRef<ServerState> for GuardedReviewIndex {
    fn from_ref(input: &ServerState) -> Self {
        input.review_index.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
