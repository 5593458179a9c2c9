//! Precomputed tiered lookup over all salons, rebuilt on demand.

mod builder;
mod handle;
mod models;

pub use builder::build_index;
pub use handle::{IndexRebuildError, ReviewIndexHandle};
pub use models::{CityIndex, CityKey, IndexStats, IndexedSalon, ReviewIndex, ReviewTier};
