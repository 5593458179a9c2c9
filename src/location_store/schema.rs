//! Database schema for locations.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const SALONS_TABLE_V0: Table = Table {
    name: "salons",
    columns: &[
        sqlite_column!("place_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("address", &SqlType::Text, non_null = true),
        sqlite_column!("city", &SqlType::Text, non_null = true),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        sqlite_column!("rating", &SqlType::Real, non_null = true),
        sqlite_column!("review_count", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "enrichment_status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!("enriched_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_salons_state_city", "state, city"),
        ("idx_salons_review_count", "review_count"),
    ],
};

/// One row per enriched salon, the payload is the serialized `EnrichedSalonData`.
const ENRICHED_SALONS_TABLE_V0: Table = Table {
    name: "enriched_salons",
    columns: &[
        sqlite_column!("place_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("enriched_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

pub const LOCATIONS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[SALONS_TABLE_V0, ENRICHED_SALONS_TABLE_V0],
    migration: None,
}];
