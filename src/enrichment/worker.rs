//! Enriches a single salon: details lookup, one consolidated generation
//! call, then an atomic save.

use super::models::EnrichError;
use crate::location_store::{EnrichedSalonData, LocationStore};
use crate::providers::{ContentGenerator, LocationDetailsProvider, PlaceDetails, ProviderError};
use crate::server::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Places lookups attempted per salon when the network drops.
const MAX_DETAILS_CALLS: usize = 2;

/// Price per call of each metered provider, in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderCosts {
    pub places_usd: f64,
    pub generative_usd: f64,
}

impl ProviderCosts {
    pub fn per_salon(&self) -> f64 {
        self.places_usd + self.generative_usd
    }
}

/// Costs incurred by one enrichment attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Charges {
    pub places: f64,
    pub generative: f64,
}

impl Charges {
    pub fn total(&self) -> f64 {
        self.places + self.generative
    }

    pub fn is_zero(&self) -> bool {
        self.places == 0.0 && self.generative == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    Enriched { enriched_at: i64 },
    /// Still within the freshness window, no provider was called.
    SkippedFresh,
}

/// Result of one attempt with whatever it cost, success or not.
#[derive(Debug)]
pub struct EnrichAttempt {
    pub result: Result<EnrichOutcome, EnrichError>,
    pub charges: Charges,
    /// Details fetched by a failed attempt, reusable by the next one.
    pub details: Option<PlaceDetails>,
}

pub struct EnrichmentWorker {
    store: Arc<dyn LocationStore>,
    places: Arc<dyn LocationDetailsProvider>,
    generator: Arc<dyn ContentGenerator>,
    costs: ProviderCosts,
    freshness_secs: i64,
}

impl EnrichmentWorker {
    pub fn new(
        store: Arc<dyn LocationStore>,
        places: Arc<dyn LocationDetailsProvider>,
        generator: Arc<dyn ContentGenerator>,
        costs: ProviderCosts,
        freshness_days: u32,
    ) -> Self {
        Self {
            store,
            places,
            generator,
            costs,
            freshness_secs: freshness_days as i64 * 24 * 3600,
        }
    }

    pub fn costs(&self) -> ProviderCosts {
        self.costs
    }

    pub fn store(&self) -> &Arc<dyn LocationStore> {
        &self.store
    }

    /// Enrich one salon as a single all-or-nothing unit.
    ///
    /// A fresh salon short-circuits before any provider call unless
    /// `force_refresh` is set.
    pub async fn enrich(&self, place_id: &str, force_refresh: bool) -> EnrichAttempt {
        self.enrich_with(place_id, force_refresh, None).await
    }

    /// Like [`EnrichmentWorker::enrich`], starting from details a previous
    /// attempt already paid for. Only the generation call is made then.
    pub async fn enrich_with(
        &self,
        place_id: &str,
        force_refresh: bool,
        details: Option<PlaceDetails>,
    ) -> EnrichAttempt {
        let mut charges = Charges::default();
        let mut details = details;
        let result = self
            .run(place_id, force_refresh, &mut charges, &mut details)
            .await;
        EnrichAttempt {
            result,
            charges,
            details,
        }
    }

    /// Look up details, retrying a dropped connection or timeout once.
    /// Every HTTP call is charged.
    async fn fetch_details(
        &self,
        place_id: &str,
        charges: &mut Charges,
    ) -> Result<PlaceDetails, EnrichError> {
        let mut calls = 0;
        loop {
            calls += 1;
            charges.places += self.costs.places_usd;
            match self.places.fetch_details(place_id).await {
                Err(e) if e.is_network() && calls < MAX_DETAILS_CALLS => {
                    warn!("Places lookup for {} failed ({}), retrying once", place_id, e);
                }
                result => return result.map_err(|e| provider_error(self.places.name(), e)),
            }
        }
    }

    async fn run(
        &self,
        place_id: &str,
        force_refresh: bool,
        charges: &mut Charges,
        details: &mut Option<PlaceDetails>,
    ) -> Result<EnrichOutcome, EnrichError> {
        let salon = self
            .store
            .get_salon(place_id)
            .map_err(|e| EnrichError::Persistence(format!("{:#}", e)))?
            .ok_or_else(|| EnrichError::MissingSalon(place_id.to_string()))?;

        let now = chrono::Utc::now().timestamp();
        if !force_refresh && salon.is_fresh(now, self.freshness_secs) {
            debug!("{} is fresh, skipping provider calls", place_id);
            return Ok(EnrichOutcome::SkippedFresh);
        }

        let fetched = match details.take() {
            Some(held) => held,
            None => self.fetch_details(place_id, charges).await?,
        };
        let held = details.insert(fetched);

        charges.generative += self.costs.generative_usd;
        let content = self
            .generator
            .generate(&salon, held)
            .await
            .map_err(|e| provider_error(self.generator.name(), e))?;

        let enriched_at = chrono::Utc::now().timestamp();
        let data = EnrichedSalonData {
            place_id: place_id.to_string(),
            details: held.clone(),
            content,
            enriched_at,
        };
        self.store
            .save_enrichment(&data)
            .map_err(|e| EnrichError::Persistence(format!("{:#}", e)))?;

        *details = None;
        Ok(EnrichOutcome::Enriched { enriched_at })
    }
}

fn provider_error(provider: &str, source: ProviderError) -> EnrichError {
    metrics::record_provider_error(provider, source.label());
    EnrichError::Provider {
        provider: provider.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::FailureKind;
    use crate::location_store::EnrichmentStatus;
    use crate::test_support::{salon, FakeGenerator, FakePlaces, FlakyStore};
    use std::sync::atomic::Ordering;

    const COSTS: ProviderCosts = ProviderCosts {
        places_usd: 0.017,
        generative_usd: 0.013,
    };

    struct Fixture {
        store: Arc<FlakyStore>,
        places: Arc<FakePlaces>,
        generator: Arc<FakeGenerator>,
        worker: EnrichmentWorker,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(FlakyStore::new());
        store.upsert_salon(&salon("a", "TX", "Austin", 120)).unwrap();
        let places = Arc::new(FakePlaces::new());
        let generator = Arc::new(FakeGenerator::new());
        let worker = EnrichmentWorker::new(
            store.clone(),
            places.clone(),
            generator.clone(),
            COSTS,
            30,
        );
        Fixture {
            store,
            places,
            generator,
            worker,
        }
    }

    #[tokio::test]
    async fn test_enrich_persists_and_charges_both_providers() {
        let f = fixture();
        let attempt = f.worker.enrich("a", false).await;

        assert!(matches!(attempt.result, Ok(EnrichOutcome::Enriched { .. })));
        assert_eq!(attempt.charges.places, 0.017);
        assert_eq!(attempt.charges.generative, 0.013);

        let record = f.store.get_salon("a").unwrap().unwrap();
        assert_eq!(record.enrichment_status, EnrichmentStatus::Enriched);
        assert!(record.enriched_at.is_some());
        let data = f.store.get_enriched_data("a").unwrap().unwrap();
        assert_eq!(data.details.place_id, "a");
    }

    #[tokio::test]
    async fn test_second_enrich_of_fresh_salon_is_a_noop() {
        let f = fixture();
        f.worker.enrich("a", false).await.result.unwrap();
        let second = f.worker.enrich("a", false).await;

        assert_eq!(second.result.unwrap(), EnrichOutcome::SkippedFresh);
        assert!(second.charges.is_zero());
        assert_eq!(f.places.calls(), 1);
        assert_eq!(f.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_calls_providers_again() {
        let f = fixture();
        f.worker.enrich("a", false).await.result.unwrap();
        f.worker.enrich("a", true).await.result.unwrap();
        assert_eq!(f.places.calls(), 2);
        assert_eq!(f.generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_generator_failure_still_charges_places() {
        let f = fixture();
        f.generator.fail("a", ProviderError::RateLimited, 1);

        let attempt = f.worker.enrich("a", false).await;
        let error = attempt.result.unwrap_err();
        assert_eq!(error.kind(), FailureKind::RateLimited);
        assert_eq!(attempt.charges.places, 0.017);
        assert_eq!(attempt.charges.generative, 0.013);
        assert_eq!(
            f.store.get_salon("a").unwrap().unwrap().enrichment_status,
            EnrichmentStatus::Pending
        );
    }

    fn enriched_days_ago(place_id: &str, days: i64) -> crate::location_store::SalonRecord {
        let mut record = salon(place_id, "TX", "Austin", 150);
        record.enrichment_status = EnrichmentStatus::Enriched;
        record.enriched_at = Some(chrono::Utc::now().timestamp() - days * 24 * 3600);
        record
    }

    #[tokio::test]
    async fn test_stale_salon_is_enriched_again() {
        let f = fixture();
        let stale = enriched_days_ago("stale", 45);
        f.store.upsert_salon(&stale).unwrap();

        let attempt = f.worker.enrich("stale", false).await;
        let enriched_at = match attempt.result.unwrap() {
            EnrichOutcome::Enriched { enriched_at } => enriched_at,
            other => panic!("expected enrichment, got {:?}", other),
        };
        assert_eq!(f.places.calls(), 1);
        assert_eq!(f.generator.calls(), 1);
        assert!(enriched_at > stale.enriched_at.unwrap());

        let record = f.store.get_salon("stale").unwrap().unwrap();
        assert_eq!(record.enrichment_status, EnrichmentStatus::Enriched);
        assert_eq!(record.enriched_at, Some(enriched_at));
    }

    #[tokio::test]
    async fn test_recently_enriched_salon_makes_no_calls() {
        let f = fixture();
        f.store.upsert_salon(&enriched_days_ago("recent", 10)).unwrap();

        let attempt = f.worker.enrich("recent", false).await;
        assert_eq!(attempt.result.unwrap(), EnrichOutcome::SkippedFresh);
        assert!(attempt.charges.is_zero());
        assert_eq!(f.places.calls(), 0);
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_is_retried_and_each_call_charged() {
        let f = fixture();
        f.places.fail("a", ProviderError::Timeout, 1);

        let attempt = f.worker.enrich("a", false).await;
        assert!(matches!(attempt.result, Ok(EnrichOutcome::Enriched { .. })));
        assert_eq!(f.places.calls(), 2);
        assert!((attempt.charges.places - 0.034).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_second_network_failure_gives_up() {
        let f = fixture();
        f.places.fail("a", ProviderError::Connection("reset".into()), 2);

        let attempt = f.worker.enrich("a", false).await;
        assert_eq!(attempt.result.unwrap_err().kind(), FailureKind::ProviderError);
        assert_eq!(f.places.calls(), 2);
        assert!(attempt.details.is_none());
    }

    #[tokio::test]
    async fn test_held_details_skip_the_places_call() {
        let f = fixture();
        f.generator.fail("a", ProviderError::Timeout, 1);

        let first = f.worker.enrich("a", false).await;
        assert!(first.result.is_err());
        let held = first.details.expect("details kept after generation failure");

        let second = f.worker.enrich_with("a", false, Some(held)).await;
        assert!(matches!(second.result, Ok(EnrichOutcome::Enriched { .. })));
        assert_eq!(second.charges.places, 0.0);
        assert_eq!(second.charges.generative, 0.013);
        assert!(second.details.is_none());
        assert_eq!(f.places.calls(), 1);
        assert_eq!(f.generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_places_failure_skips_generation() {
        let f = fixture();
        f.places.fail("a", ProviderError::NotFound("a".into()), 1);

        let attempt = f.worker.enrich("a", false).await;
        assert_eq!(attempt.result.unwrap_err().kind(), FailureKind::NotFound);
        assert_eq!(attempt.charges.generative, 0.0);
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_a_persistence_error() {
        let f = fixture();
        f.store.fail_saves.store(true, Ordering::SeqCst);

        let attempt = f.worker.enrich("a", false).await;
        assert_eq!(attempt.result.unwrap_err().kind(), FailureKind::Persistence);
        assert!(f.store.get_enriched_data("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_salon() {
        let f = fixture();
        let attempt = f.worker.enrich("ghost", false).await;
        assert!(matches!(
            attempt.result,
            Err(EnrichError::MissingSalon(_))
        ));
        assert_eq!(f.places.calls(), 0);
    }
}
