//! Batch enrichment of salons: per-salon worker, job controller, progress
//! and the durable job record.

mod circuit_breaker;
mod controller;
mod job_store;
mod models;
mod progress;
mod retry_policy;
mod worker;

pub use circuit_breaker::{BreakerAction, PersistenceBreaker};
pub use controller::JobManager;
pub use job_store::{JobStore, PersistedJob, SqliteJobStore};
pub use models::{EnrichError, FailedSalon, FailureKind, JobError, JobState};
pub use progress::{
    CostLedger, DurationAverage, LogEntry, LogLevel, LogRing, ProgressSnapshot, ProgressStore,
    DEFAULT_LOG_CAPACITY, MAX_FAILED_SALONS,
};
pub use retry_policy::RetryPolicy;
pub use worker::{Charges, EnrichAttempt, EnrichOutcome, EnrichmentWorker, ProviderCosts};
