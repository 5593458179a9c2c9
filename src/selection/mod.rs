//! Selection strategies building the enrichment queue.

mod models;
mod strategy;

pub use models::{
    QueueEntry, RawSelectionRequest, Selection, SelectionError, SelectionRequest,
    SelectionStrategy, DEFAULT_TOP_PER_CITY, MAX_TOP_PER_CITY,
};
pub use strategy::{build_explicit, build_filtered, Freshness};
