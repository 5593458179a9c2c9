//! Read/write access to the state -> city -> salon hierarchy.

mod import;
mod models;
mod schema;
mod store;
mod trait_def;

pub use import::{import_salons_json, SalonImportRow};
pub use models::{CitySummary, EnrichedSalonData, EnrichmentStatus, SalonRecord, StateSummary};
pub use store::SqliteLocationStore;
pub use trait_def::LocationStore;
