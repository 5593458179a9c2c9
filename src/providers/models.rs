//! Payloads produced by the providers.

use serde::{Deserialize, Serialize};

/// Canonical metadata from the location-details provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
    pub place_id: String,
    pub name: String,
    pub formatted_address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub maps_url: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    /// One human-readable line per weekday, e.g. "Monday: 9:00 AM – 7:00 PM".
    #[serde(default)]
    pub opening_hours: Vec<String>,
    #[serde(default)]
    pub photo_refs: Vec<String>,
    /// Review texts, fed to the generator for sentiment insights.
    #[serde(default)]
    pub review_snippets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReviewInsights {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

/// Every generated section, produced by one consolidated prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub about: String,
    pub review_insights: ReviewInsights,
    #[serde(default)]
    pub faq: Vec<FaqEntry>,
    pub parking_guide: String,
    pub best_times: String,
}

impl GeneratedContent {
    /// Rejects payloads missing any of the sections we publish.
    pub fn validate(&self) -> Result<(), String> {
        if self.about.trim().is_empty() {
            return Err("missing about text".to_string());
        }
        if self.parking_guide.trim().is_empty() {
            return Err("missing parking guide".to_string());
        }
        if self.best_times.trim().is_empty() {
            return Err("missing best times".to_string());
        }
        if self.faq.is_empty() {
            return Err("missing FAQ".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
impl PlaceDetails {
    pub(crate) fn sample(place_id: &str) -> Self {
        Self {
            place_id: place_id.to_string(),
            name: format!("Salon {}", place_id),
            formatted_address: Some("1 Main St".to_string()),
            phone: Some("+1 555 0100".to_string()),
            website: None,
            maps_url: None,
            rating: Some(4.6),
            user_ratings_total: Some(210),
            opening_hours: vec!["Monday: 9:00 AM – 7:00 PM".to_string()],
            photo_refs: vec!["photo-1".to_string()],
            review_snippets: vec!["Great cut".to_string()],
        }
    }
}

#[cfg(test)]
impl GeneratedContent {
    pub(crate) fn sample() -> Self {
        Self {
            about: "A friendly neighborhood salon.".to_string(),
            review_insights: ReviewInsights {
                summary: "Customers love the stylists.".to_string(),
                highlights: vec!["friendly staff".to_string()],
                concerns: vec![],
            },
            faq: vec![FaqEntry {
                question: "Do they take walk-ins?".to_string(),
                answer: "Yes, on weekdays.".to_string(),
            }],
            parking_guide: "Free lot behind the building.".to_string(),
            best_times: "Weekday mornings.".to_string(),
        }
    }
}
