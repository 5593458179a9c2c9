//! Location records and the enrichment payload persisted alongside them.

use crate::providers::{GeneratedContent, PlaceDetails};
use serde::{Deserialize, Serialize};

/// Enrichment lifecycle of a salon record.
///
/// Transitions are pending -> enriched and pending -> failed. A failed record
/// becomes enriched on a later successful run. An enriched record never goes
/// back to failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Enriched,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Enriched => "enriched",
            EnrichmentStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "enriched" => EnrichmentStatus::Enriched,
            "failed" => EnrichmentStatus::Failed,
            _ => EnrichmentStatus::Pending,
        }
    }
}

/// A business location, keyed by its stable place id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalonRecord {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub rating: f64,
    pub review_count: u32,
    pub enrichment_status: EnrichmentStatus,
    /// Unix timestamp (seconds) of the last successful enrichment.
    pub enriched_at: Option<i64>,
}

impl SalonRecord {
    /// True when the record was enriched less than `freshness_secs` before `now`.
    pub fn is_fresh(&self, now: i64, freshness_secs: i64) -> bool {
        match (self.enrichment_status, self.enriched_at) {
            (EnrichmentStatus::Enriched, Some(at)) => now - at < freshness_secs,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSummary {
    pub state: String,
    pub salon_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitySummary {
    pub state: String,
    pub city: String,
    pub salon_count: usize,
}

/// Provider metadata merged with generated sections for one salon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSalonData {
    pub place_id: String,
    pub details: PlaceDetails,
    pub content: GeneratedContent,
    pub enriched_at: i64,
}
