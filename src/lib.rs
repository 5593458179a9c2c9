//! Salon Enrichment Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod enrichment;
pub mod location_store;
pub mod providers;
pub mod review_index;
pub mod selection;
pub mod server;
pub mod sqlite_persistence;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use enrichment::{EnrichmentWorker, JobManager, JobState, SqliteJobStore};
pub use location_store::{LocationStore, SqliteLocationStore};
pub use review_index::ReviewIndexHandle;
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
