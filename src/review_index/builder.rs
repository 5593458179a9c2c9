//! Builds a [`ReviewIndex`] by streaming the location store one city
//! partition at a time.

use super::models::{CityIndex, IndexStats, IndexedSalon, ReviewIndex, ReviewTier};
use crate::location_store::LocationStore;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

const MIN_INDEXED_REVIEWS: u32 = 50;

pub fn build_index(store: &dyn LocationStore) -> Result<ReviewIndex> {
    let started = Instant::now();
    let mut states: BTreeMap<String, BTreeMap<String, CityIndex>> = BTreeMap::new();
    let mut tier_counts: BTreeMap<String, usize> = ReviewTier::INDEXED
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();
    let mut total_salons = 0usize;
    let mut cities_included = 0usize;

    for state in store.list_states().context("Failed to list states")? {
        let cities = store
            .list_cities(&state.state)
            .with_context(|| format!("Failed to list cities of {}", state.state))?;

        for city in cities {
            let partition = store
                .list_salons(&state.state, &city.city)
                .with_context(|| format!("Failed to read {}, {}", city.city, state.state))?;

            let mut salons: Vec<IndexedSalon> = partition
                .iter()
                .filter(|s| s.review_count >= MIN_INDEXED_REVIEWS)
                .map(|s| IndexedSalon {
                    place_id: s.place_id.clone(),
                    name: s.name.clone(),
                    review_count: s.review_count,
                    rating: s.rating,
                })
                .collect();
            salons.sort_by(|a, b| {
                b.review_count
                    .cmp(&a.review_count)
                    .then_with(|| a.name.cmp(&b.name))
            });

            let entry = CityIndex {
                total_salons: partition.len(),
                salons,
            };
            for tier in ReviewTier::INDEXED {
                if let Some(count) = tier_counts.get_mut(tier.as_str()) {
                    *count += entry.tier_count(tier);
                }
            }
            total_salons += entry.total_salons;
            if !entry.salons.is_empty() {
                cities_included += 1;
            }
            debug!(
                "Indexed {}, {}: {} salons, {} with 50+ reviews",
                city.city,
                state.state,
                entry.total_salons,
                entry.salons.len()
            );

            states
                .entry(state.state.clone())
                .or_default()
                .insert(city.city, entry);
        }
    }

    let states_included = states
        .values()
        .filter(|cities| cities.values().any(|c| !c.salons.is_empty()))
        .count();
    let stats = IndexStats {
        total_salons,
        cities_included,
        states_included,
        tier_counts,
        processing_time_seconds: started.elapsed().as_secs_f64(),
        built_at: chrono::Utc::now().timestamp(),
    };
    info!(
        "Review index built: {} salons, {} cities, {} states in {:.2}s",
        stats.total_salons, stats.cities_included, stats.states_included, stats.processing_time_seconds
    );

    Ok(ReviewIndex { states, stats })
}
