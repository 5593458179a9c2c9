//! Shared constants for end-to-end tests
//!
//! When the seeded locations change, update only this file.

// ============================================================================
// Seeded locations
// ============================================================================

pub const STATE_TX: &str = "TX";
pub const STATE_CA: &str = "CA";

pub const CITY_AUSTIN: &str = "Austin";
pub const CITY_DALLAS: &str = "Dallas";
pub const CITY_SAN_ANTONIO: &str = "San Antonio";
pub const CITY_FRESNO: &str = "Fresno";

/// Austin salons, "aus-0".."aus-11", 100..=111 reviews
pub const AUSTIN_SALON_COUNT: usize = 12;
/// Dallas salons, "dal-0".."dal-2", 100..=102 reviews
pub const DALLAS_SALON_COUNT: usize = 3;
/// San Antonio salons with 600 and 20 reviews
pub const SAN_ANTONIO_POPULAR_ID: &str = "sat-popular";
pub const SAN_ANTONIO_QUIET_ID: &str = "sat-quiet";
/// Fresno salons, all under 50 reviews
pub const FRESNO_SALON_COUNT: usize = 2;

// ============================================================================
// Costs
// ============================================================================

pub const PLACES_COST_USD: f64 = 0.017;
pub const GENERATIVE_COST_USD: f64 = 0.013;

// ============================================================================
// Timeouts
// ============================================================================

pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;
pub const JOB_WAIT_TIMEOUT_MS: u64 = 15000;
