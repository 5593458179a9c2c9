//! Seeding the location store from a JSON export.

use super::models::{EnrichmentStatus, SalonRecord};
use super::trait_def::LocationStore;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// One salon as exported by the location scraper.
#[derive(Debug, Deserialize)]
pub struct SalonImportRow {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
}

/// Upsert every salon of a JSON array file, returning how many were read.
///
/// Re-importing a salon refreshes its listing data but keeps its
/// enrichment status and timestamp.
pub fn import_salons_json(store: &dyn LocationStore, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read salon import file {:?}", path))?;
    let rows: Vec<SalonImportRow> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse salon import file {:?}", path))?;

    for row in &rows {
        let existing = store.get_salon(&row.place_id)?;
        let (enrichment_status, enriched_at) = existing
            .map(|s| (s.enrichment_status, s.enriched_at))
            .unwrap_or((EnrichmentStatus::Pending, None));
        store.upsert_salon(&SalonRecord {
            place_id: row.place_id.clone(),
            name: row.name.clone(),
            address: row.address.clone(),
            city: row.city.clone(),
            state: row.state.clone(),
            rating: row.rating,
            review_count: row.review_count,
            enrichment_status,
            enriched_at,
        })?;
    }

    info!("Imported {} salons from {:?}", rows.len(), path);
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location_store::SqliteLocationStore;
    use tempfile::TempDir;

    #[test]
    fn test_import_keeps_enrichment_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("salons.json");
        std::fs::write(
            &path,
            r#"[
                {"place_id": "p1", "name": "Shear Bliss", "city": "Austin", "state": "TX", "review_count": 210},
                {"place_id": "p2", "name": "Glow", "city": "Dallas", "state": "TX", "rating": 4.8}
            ]"#,
        )
        .unwrap();

        let store = SqliteLocationStore::in_memory().unwrap();
        assert_eq!(import_salons_json(&store, &path).unwrap(), 2);
        store.mark_failed("p1").unwrap();

        assert_eq!(import_salons_json(&store, &path).unwrap(), 2);
        let p1 = store.get_salon("p1").unwrap().unwrap();
        assert_eq!(p1.enrichment_status, EnrichmentStatus::Failed);
        assert_eq!(p1.review_count, 210);
        assert_eq!(store.get_salon("p2").unwrap().unwrap().review_count, 0);
    }

    #[test]
    fn test_import_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("salons.json");
        std::fs::write(&path, r#"[{"place_id": "p1"}]"#).unwrap();
        let store = SqliteLocationStore::in_memory().unwrap();
        assert!(import_salons_json(&store, &path).is_err());
    }
}
