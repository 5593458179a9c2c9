//! Seed data for the location store

use super::constants::*;
use salon_enrichment_server::location_store::{EnrichmentStatus, LocationStore, SalonRecord};

fn salon(place_id: String, state: &str, city: &str, reviews: u32) -> SalonRecord {
    SalonRecord {
        name: format!("Salon {}", place_id),
        place_id,
        address: format!("{} Main St", reviews),
        city: city.to_string(),
        state: state.to_string(),
        rating: 4.5,
        review_count: reviews,
        enrichment_status: EnrichmentStatus::Pending,
        enriched_at: None,
    }
}

pub fn seed_locations(store: &dyn LocationStore) -> anyhow::Result<()> {
    for i in 0..AUSTIN_SALON_COUNT {
        store.upsert_salon(&salon(
            format!("aus-{}", i),
            STATE_TX,
            CITY_AUSTIN,
            100 + i as u32,
        ))?;
    }
    for i in 0..DALLAS_SALON_COUNT {
        store.upsert_salon(&salon(
            format!("dal-{}", i),
            STATE_TX,
            CITY_DALLAS,
            100 + i as u32,
        ))?;
    }
    store.upsert_salon(&salon(
        SAN_ANTONIO_POPULAR_ID.to_string(),
        STATE_TX,
        CITY_SAN_ANTONIO,
        600,
    ))?;
    store.upsert_salon(&salon(
        SAN_ANTONIO_QUIET_ID.to_string(),
        STATE_TX,
        CITY_SAN_ANTONIO,
        20,
    ))?;
    for i in 0..FRESNO_SALON_COUNT {
        store.upsert_salon(&salon(format!("fre-{}", i), STATE_CA, CITY_FRESNO, 30))?;
    }
    Ok(())
}
