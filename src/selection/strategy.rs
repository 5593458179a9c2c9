//! Turns a filter or an explicit id list into an ordered salon queue.

use super::models::{QueueEntry, Selection, SelectionError, SelectionRequest, SelectionStrategy};
use crate::location_store::{LocationStore, SalonRecord};
use crate::review_index::{CityKey, ReviewIndex, ReviewTier};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Freshness window evaluated at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    pub now: i64,
    pub window_secs: i64,
}

impl Freshness {
    pub fn days(now: i64, days: u32) -> Self {
        Self {
            now,
            window_secs: days as i64 * 24 * 3600,
        }
    }

    pub fn is_fresh(&self, salon: &SalonRecord) -> bool {
        salon.is_fresh(self.now, self.window_secs)
    }
}

/// Split candidates into queue and skipped, deduplicating by place id.
struct Collector {
    freshness: Freshness,
    force_refresh: bool,
    seen: HashSet<String>,
    selection: Selection,
}

impl Collector {
    fn new(freshness: Freshness, force_refresh: bool) -> Self {
        Self {
            freshness,
            force_refresh,
            seen: HashSet::new(),
            selection: Selection::default(),
        }
    }

    fn push(&mut self, salon: &SalonRecord) {
        if !self.seen.insert(salon.place_id.clone()) {
            return;
        }
        if !self.force_refresh && self.freshness.is_fresh(salon) {
            self.selection.skipped.push(salon.place_id.clone());
            return;
        }
        self.selection.queue.push(QueueEntry {
            place_id: salon.place_id.clone(),
            name: salon.name.clone(),
            state: salon.state.clone(),
            city: salon.city.clone(),
            retries: 0,
        });
    }
}

/// Candidates of one city for the tier, most reviewed first.
fn city_candidates(
    store: &dyn LocationStore,
    index: &ReviewIndex,
    city: &CityKey,
    tier: ReviewTier,
) -> Result<Vec<SalonRecord>, SelectionError> {
    let partition = store.list_salons(&city.state, &city.city)?;
    if tier == ReviewTier::All {
        return Ok(partition);
    }

    let mut by_id: HashMap<String, SalonRecord> = partition
        .into_iter()
        .map(|s| (s.place_id.clone(), s))
        .collect();
    // Salons removed from the store since the last rebuild are dropped.
    Ok(index
        .salons_for(&city.state, &city.city, tier)
        .iter()
        .filter_map(|indexed| by_id.remove(&indexed.place_id))
        .collect())
}

/// Strategy-driven selection over the priority city set.
pub fn build_filtered(
    store: &dyn LocationStore,
    index: &ReviewIndex,
    request: &SelectionRequest,
    default_city_limit: usize,
    freshness: Freshness,
) -> Result<Selection, SelectionError> {
    if index.is_empty() {
        return Err(SelectionError::Validation(
            "Review index is empty, rebuild it before starting a filtered run".to_string(),
        ));
    }

    let city_limit = request.city_limit.unwrap_or(default_city_limit);
    let cities = index.top_cities(city_limit, request.review_tier);
    let mut collector = Collector::new(freshness, request.force_refresh);

    for city in &cities {
        let candidates = city_candidates(store, index, city, request.review_tier)?;
        let take = match request.strategy {
            SelectionStrategy::AllMatching => candidates.len(),
            SelectionStrategy::TopPerCity => request.top_per_city_count.min(candidates.len()),
        };
        debug!(
            "Selecting {} of {} candidates in {}, {}",
            take,
            candidates.len(),
            city.city,
            city.state
        );
        for salon in candidates.iter().take(take) {
            collector.push(salon);
        }
    }

    collector.selection.cities = cities;
    Ok(collector.selection)
}

/// Caller-supplied salon set, bypassing the strategies.
pub fn build_explicit(
    store: &dyn LocationStore,
    place_ids: &[String],
    force_refresh: bool,
    freshness: Freshness,
) -> Result<Selection, SelectionError> {
    if place_ids.is_empty() {
        return Err(SelectionError::Validation(
            "place_ids must not be empty".to_string(),
        ));
    }

    let mut salons = Vec::with_capacity(place_ids.len());
    let mut unknown = Vec::new();
    let mut requested = HashSet::new();
    for place_id in place_ids {
        if !requested.insert(place_id.as_str()) {
            continue;
        }
        match store.get_salon(place_id)? {
            Some(salon) => salons.push(salon),
            None => unknown.push(place_id.as_str()),
        }
    }
    if !unknown.is_empty() {
        return Err(SelectionError::Validation(format!(
            "Unknown place ids: {}",
            unknown.join(", ")
        )));
    }

    let mut collector = Collector::new(freshness, force_refresh);
    let mut cities: Vec<CityKey> = Vec::new();
    for salon in &salons {
        let key = CityKey::new(salon.state.clone(), salon.city.clone());
        if !cities.contains(&key) {
            cities.push(key);
        }
        collector.push(salon);
    }

    collector.selection.cities = cities;
    Ok(collector.selection)
}
