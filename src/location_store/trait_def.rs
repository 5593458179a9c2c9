//! LocationStore trait definition.

use super::models::{CitySummary, EnrichedSalonData, SalonRecord, StateSummary};
use anyhow::Result;

/// Hierarchical state -> city -> salon access, partitioned by city.
///
/// The enrichment pipeline only writes the enrichment status, timestamp and
/// payload. Everything else is owned by whoever imports the locations.
pub trait LocationStore: Send + Sync {
    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// States with their salon counts, ordered by state name.
    fn list_states(&self) -> Result<Vec<StateSummary>>;

    /// Cities of a state with their salon counts, ordered by city name.
    fn list_cities(&self, state: &str) -> Result<Vec<CitySummary>>;

    /// All salons of one city partition, most reviewed first.
    fn list_salons(&self, state: &str, city: &str) -> Result<Vec<SalonRecord>>;

    /// Look up a single salon by place id.
    fn get_salon(&self, place_id: &str) -> Result<Option<SalonRecord>>;

    /// Insert or replace a salon record.
    fn upsert_salon(&self, salon: &SalonRecord) -> Result<()>;

    // =========================================================================
    // Enrichment
    // =========================================================================

    /// Get the persisted enrichment payload for a salon.
    fn get_enriched_data(&self, place_id: &str) -> Result<Option<EnrichedSalonData>>;

    /// Persist the payload and flip the salon to enriched, atomically.
    fn save_enrichment(&self, data: &EnrichedSalonData) -> Result<()>;

    /// Mark a pending salon as failed. Enriched salons are left untouched.
    fn mark_failed(&self, place_id: &str) -> Result<()>;
}
