//! Review index data structures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Review-count threshold bucket used as a quality filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReviewTier {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "50+")]
    Tier50,
    #[serde(rename = "100+")]
    Tier100,
    #[serde(rename = "200+")]
    Tier200,
    #[serde(rename = "500+")]
    Tier500,
}

impl ReviewTier {
    /// Tiers materialized in the index, loosest first.
    pub const INDEXED: [ReviewTier; 4] = [
        ReviewTier::Tier50,
        ReviewTier::Tier100,
        ReviewTier::Tier200,
        ReviewTier::Tier500,
    ];

    pub fn threshold(&self) -> u32 {
        match self {
            ReviewTier::All => 0,
            ReviewTier::Tier50 => 50,
            ReviewTier::Tier100 => 100,
            ReviewTier::Tier200 => 200,
            ReviewTier::Tier500 => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewTier::All => "all",
            ReviewTier::Tier50 => "50+",
            ReviewTier::Tier100 => "100+",
            ReviewTier::Tier200 => "200+",
            ReviewTier::Tier500 => "500+",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "all" => Some(ReviewTier::All),
            "50+" => Some(ReviewTier::Tier50),
            "100+" => Some(ReviewTier::Tier100),
            "200+" => Some(ReviewTier::Tier200),
            "500+" => Some(ReviewTier::Tier500),
            _ => None,
        }
    }
}

/// A (state, city) partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CityKey {
    pub state: String,
    pub city: String,
}

impl CityKey {
    pub fn new(state: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            city: city.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSalon {
    pub place_id: String,
    pub name: String,
    pub review_count: u32,
    pub rating: f64,
}

/// Index entry for one city partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityIndex {
    /// Every salon in the partition, indexed or not.
    pub total_salons: usize,
    /// Salons with at least 50 reviews, most reviewed first.
    pub salons: Vec<IndexedSalon>,
}

impl CityIndex {
    /// Prefix of the sorted list meeting the tier threshold.
    pub fn tier_slice(&self, tier: ReviewTier) -> &[IndexedSalon] {
        let threshold = tier.threshold();
        let end = self
            .salons
            .partition_point(|s| s.review_count >= threshold);
        &self.salons[..end]
    }

    pub fn tier_count(&self, tier: ReviewTier) -> usize {
        match tier {
            ReviewTier::All => self.total_salons,
            _ => self.tier_slice(tier).len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_salons: usize,
    pub cities_included: usize,
    pub states_included: usize,
    /// Keyed by tier label ("50+", "100+", ...).
    pub tier_counts: BTreeMap<String, usize>,
    pub processing_time_seconds: f64,
    /// Unix timestamp of the build, 0 for an empty index.
    pub built_at: i64,
}

/// Immutable tiered lookup over all salons. Rebuilt wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewIndex {
    /// state -> city -> entry
    pub(super) states: BTreeMap<String, BTreeMap<String, CityIndex>>,
    pub(super) stats: IndexStats,
}

impl ReviewIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub fn city(&self, state: &str, city: &str) -> Option<&CityIndex> {
        self.states.get(state).and_then(|cities| cities.get(city))
    }

    /// Indexed salons of a city meeting the tier, most reviewed first.
    ///
    /// For [`ReviewTier::All`] this is every indexed salon (50+ reviews);
    /// callers needing the full partition read it from the location store.
    pub fn salons_for(&self, state: &str, city: &str, tier: ReviewTier) -> &[IndexedSalon] {
        self.city(state, city)
            .map(|c| c.tier_slice(tier))
            .unwrap_or(&[])
    }

    pub fn tier_count(&self, state: &str, city: &str, tier: ReviewTier) -> usize {
        self.city(state, city)
            .map(|c| c.tier_count(tier))
            .unwrap_or(0)
    }

    pub fn cities(&self) -> impl Iterator<Item = (&str, &str, &CityIndex)> {
        self.states.iter().flat_map(|(state, cities)| {
            cities
                .iter()
                .map(move |(city, entry)| (state.as_str(), city.as_str(), entry))
        })
    }

    /// Priority city set: up to `n` cities with salons in the tier, ordered
    /// by tier salon count descending, ties by state then city name.
    pub fn top_cities(&self, n: usize, tier: ReviewTier) -> Vec<CityKey> {
        let mut ranked: Vec<(usize, CityKey)> = self
            .cities()
            .map(|(state, city, entry)| (entry.tier_count(tier), CityKey::new(state, city)))
            .filter(|(count, _)| *count > 0)
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        ranked.into_iter().take(n).map(|(_, key)| key).collect()
    }
}
