use crate::review_index::{CityKey, ReviewTier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TOP_PER_CITY: usize = 10;
pub const MAX_TOP_PER_CITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Union of every salon in the tier across the target cities.
    AllMatching,
    /// The N most reviewed salons of each target city.
    TopPerCity,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::AllMatching => "all-matching",
            SelectionStrategy::TopPerCity => "top-per-city",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "all-matching" => Some(SelectionStrategy::AllMatching),
            "top-per-city" => Some(SelectionStrategy::TopPerCity),
            _ => None,
        }
    }
}

/// Validated filter for a strategy-driven run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub review_tier: ReviewTier,
    pub strategy: SelectionStrategy,
    pub top_per_city_count: usize,
    /// Size of the priority city set; the configured default when absent.
    pub city_limit: Option<usize>,
    pub force_refresh: bool,
}

/// Unvalidated request as it arrives from an operator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSelectionRequest {
    pub review_tier: Option<String>,
    pub strategy: Option<String>,
    pub top_per_city_count: Option<i64>,
    pub city_limit: Option<i64>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl RawSelectionRequest {
    pub fn validate(self) -> Result<SelectionRequest, SelectionError> {
        let review_tier = match self.review_tier.as_deref() {
            None => ReviewTier::All,
            Some(s) => ReviewTier::parse(s).ok_or_else(|| {
                SelectionError::Validation(format!(
                    "Unknown review tier '{}', expected one of all, 50+, 100+, 200+, 500+",
                    s
                ))
            })?,
        };

        let strategy = match self.strategy.as_deref() {
            None => SelectionStrategy::TopPerCity,
            Some(s) => SelectionStrategy::parse(s).ok_or_else(|| {
                SelectionError::Validation(format!(
                    "Unknown strategy '{}', expected all-matching or top-per-city",
                    s
                ))
            })?,
        };

        let top_per_city_count = match self.top_per_city_count {
            None => DEFAULT_TOP_PER_CITY,
            Some(n) if (1..=MAX_TOP_PER_CITY as i64).contains(&n) => n as usize,
            Some(n) => {
                return Err(SelectionError::Validation(format!(
                    "top_per_city_count must be between 1 and {}, got {}",
                    MAX_TOP_PER_CITY, n
                )))
            }
        };

        let city_limit = match self.city_limit {
            None => None,
            Some(n) if n >= 1 => Some(n as usize),
            Some(n) => {
                return Err(SelectionError::Validation(format!(
                    "city_limit must be at least 1, got {}",
                    n
                )))
            }
        };

        Ok(SelectionRequest {
            review_tier,
            strategy,
            top_per_city_count,
            city_limit,
            force_refresh: self.force_refresh,
        })
    }
}

/// One salon waiting to be enriched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub place_id: String,
    pub name: String,
    pub state: String,
    pub city: String,
    /// Retries already spent on this salon.
    pub retries: u32,
}

impl QueueEntry {
    pub fn city_key(&self) -> CityKey {
        CityKey::new(self.state.clone(), self.city.clone())
    }
}

/// Ordered, deduplicated work list for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub queue: Vec<QueueEntry>,
    /// Place ids excluded because their enrichment is still fresh.
    pub skipped: Vec<String>,
    /// Target cities in processing order.
    pub cities: Vec<CityKey>,
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("{0}")]
    Validation(String),

    #[error("Location store error: {0:#}")]
    Store(#[from] anyhow::Error),
}
