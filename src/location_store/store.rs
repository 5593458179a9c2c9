//! SQLite-backed location store.

use super::models::{
    CitySummary, EnrichedSalonData, EnrichmentStatus, SalonRecord, StateSummary,
};
use super::schema::LOCATIONS_VERSIONED_SCHEMAS;
use super::trait_def::LocationStore;
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteLocationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLocationStore {
    /// Open an existing locations database or create a new one.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, LOCATIONS_VERSIONED_SCHEMAS, "locations")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        LOCATIONS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_salon(row: &rusqlite::Row) -> rusqlite::Result<SalonRecord> {
        Ok(SalonRecord {
            place_id: row.get("place_id")?,
            name: row.get("name")?,
            address: row.get("address")?,
            city: row.get("city")?,
            state: row.get("state")?,
            rating: row.get("rating")?,
            review_count: row.get("review_count")?,
            enrichment_status: EnrichmentStatus::from_db_str(
                &row.get::<_, String>("enrichment_status")?,
            ),
            enriched_at: row.get("enriched_at")?,
        })
    }
}

impl LocationStore for SqliteLocationStore {
    fn list_states(&self) -> Result<Vec<StateSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM salons GROUP BY state ORDER BY state ASC",
        )?;
        let states = stmt
            .query_map([], |row| {
                Ok(StateSummary {
                    state: row.get(0)?,
                    salon_count: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(states)
    }

    fn list_cities(&self, state: &str) -> Result<Vec<CitySummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT city, COUNT(*) FROM salons
               WHERE state = ?1
               GROUP BY city
               ORDER BY city ASC"#,
        )?;
        let cities = stmt
            .query_map([state], |row| {
                Ok(CitySummary {
                    state: state.to_string(),
                    city: row.get(0)?,
                    salon_count: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cities)
    }

    fn list_salons(&self, state: &str, city: &str) -> Result<Vec<SalonRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT * FROM salons
               WHERE state = ?1 AND city = ?2
               ORDER BY review_count DESC, name ASC"#,
        )?;
        let salons = stmt
            .query_map([state, city], Self::row_to_salon)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(salons)
    }

    fn get_salon(&self, place_id: &str) -> Result<Option<SalonRecord>> {
        let conn = self.conn.lock().unwrap();
        let salon = conn
            .query_row(
                "SELECT * FROM salons WHERE place_id = ?1",
                [place_id],
                Self::row_to_salon,
            )
            .optional()?;
        Ok(salon)
    }

    fn upsert_salon(&self, salon: &SalonRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT OR REPLACE INTO salons (
                place_id, name, address, city, state, rating, review_count,
                enrichment_status, enriched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                salon.place_id,
                salon.name,
                salon.address,
                salon.city,
                salon.state,
                salon.rating,
                salon.review_count,
                salon.enrichment_status.as_db_str(),
                salon.enriched_at,
            ],
        )?;
        Ok(())
    }

    fn get_enriched_data(&self, place_id: &str) -> Result<Option<EnrichedSalonData>> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM enriched_salons WHERE place_id = ?1",
                [place_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => {
                let data = serde_json::from_str(&json).with_context(|| {
                    format!("Corrupted enrichment payload for {}", place_id)
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    fn save_enrichment(&self, data: &EnrichedSalonData) -> Result<()> {
        let payload = serde_json::to_string(data)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            r#"UPDATE salons
               SET enrichment_status = 'enriched', enriched_at = ?2
               WHERE place_id = ?1"#,
            params![data.place_id, data.enriched_at],
        )?;
        if updated == 0 {
            anyhow::bail!("Salon {} does not exist", data.place_id);
        }

        tx.execute(
            r#"INSERT OR REPLACE INTO enriched_salons (place_id, payload, enriched_at)
               VALUES (?1, ?2, ?3)"#,
            params![data.place_id, payload, data.enriched_at],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn mark_failed(&self, place_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE salons SET enrichment_status = 'failed'
               WHERE place_id = ?1 AND enrichment_status = 'pending'"#,
            [place_id],
        )?;
        Ok(())
    }
}
