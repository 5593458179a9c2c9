//! Fakes shared by unit tests.

use crate::location_store::{
    CitySummary, EnrichedSalonData, EnrichmentStatus, LocationStore, SalonRecord,
    SqliteLocationStore, StateSummary,
};
use crate::providers::{
    ContentGenerator, GeneratedContent, LocationDetailsProvider, PlaceDetails, ProviderError,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn salon(place_id: &str, state: &str, city: &str, reviews: u32) -> SalonRecord {
    SalonRecord {
        place_id: place_id.to_string(),
        name: format!("Salon {}", place_id),
        address: "1 Main St".to_string(),
        city: city.to_string(),
        state: state.to_string(),
        rating: 4.4,
        review_count: reviews,
        enrichment_status: EnrichmentStatus::Pending,
        enriched_at: None,
    }
}

/// Scripted failures per place id, consumed in order.
#[derive(Default)]
struct FailureScript(Mutex<HashMap<String, VecDeque<ProviderError>>>);

impl FailureScript {
    fn push(&self, place_id: &str, error: ProviderError, times: usize) {
        let mut map = self.0.lock().unwrap();
        let queue = map.entry(place_id.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    fn next(&self, place_id: &str) -> Option<ProviderError> {
        self.0
            .lock()
            .unwrap()
            .get_mut(place_id)
            .and_then(|q| q.pop_front())
    }
}

#[derive(Default)]
pub struct FakePlaces {
    pub calls: AtomicUsize,
    script: FailureScript,
    delay: Option<Duration>,
}

impl FakePlaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn fail(&self, place_id: &str, error: ProviderError, times: usize) {
        self.script.push(place_id, error, times);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationDetailsProvider for FakePlaces {
    fn name(&self) -> &str {
        "places"
    }

    async fn fetch_details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.next(place_id) {
            Some(error) => Err(error),
            None => Ok(PlaceDetails::sample(place_id)),
        }
    }
}

#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    script: FailureScript,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, place_id: &str, error: ProviderError, times: usize) {
        self.script.push(place_id, error, times);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "generative"
    }

    async fn generate(
        &self,
        salon: &SalonRecord,
        _details: &PlaceDetails,
    ) -> Result<GeneratedContent, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.next(&salon.place_id) {
            Some(error) => Err(error),
            None => Ok(GeneratedContent::sample()),
        }
    }
}

/// In-memory store whose reads or saves can be switched to failing.
pub struct FlakyStore {
    pub inner: SqliteLocationStore,
    pub fail_reads: AtomicBool,
    pub fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteLocationStore::in_memory().unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
        }
    }
}

impl LocationStore for FlakyStore {
    fn list_states(&self) -> Result<Vec<StateSummary>> {
        self.inner.list_states()
    }

    fn list_cities(&self, state: &str) -> Result<Vec<CitySummary>> {
        self.inner.list_cities(state)
    }

    fn list_salons(&self, state: &str, city: &str) -> Result<Vec<SalonRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("simulated read failure");
        }
        self.inner.list_salons(state, city)
    }

    fn get_salon(&self, place_id: &str) -> Result<Option<SalonRecord>> {
        self.inner.get_salon(place_id)
    }

    fn upsert_salon(&self, salon: &SalonRecord) -> Result<()> {
        self.inner.upsert_salon(salon)
    }

    fn get_enriched_data(&self, place_id: &str) -> Result<Option<EnrichedSalonData>> {
        self.inner.get_enriched_data(place_id)
    }

    fn save_enrichment(&self, data: &EnrichedSalonData) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        self.inner.save_enrichment(data)
    }

    fn mark_failed(&self, place_id: &str) -> Result<()> {
        self.inner.mark_failed(place_id)
    }
}
