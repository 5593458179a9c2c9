//! Location-details provider backed by the Google Places details endpoint.
//!
//! Requests are spaced by a minimum interval. Every call is a metered HTTP
//! request, so retrying is left to the caller.

use super::error::ProviderError;
use super::models::PlaceDetails;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const GOOGLE_PLACES_API_BASE: &str = "https://maps.googleapis.com/maps/api/place";
const DETAIL_FIELDS: &str = "name,formatted_address,formatted_phone_number,website,url,rating,user_ratings_total,opening_hours,photos,reviews";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Source of canonical hours, address and photo metadata for a place.
#[async_trait]
pub trait LocationDetailsProvider: Send + Sync {
    /// Provider name, used as the cost ledger key.
    fn name(&self) -> &str;

    async fn fetch_details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError>;
}

pub struct GooglePlacesClient {
    client: Client,
    base_url: String,
    api_key: String,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<DetailsResult>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct DetailsResult {
    name: Option<String>,
    formatted_address: Option<String>,
    formatted_phone_number: Option<String>,
    website: Option<String>,
    url: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
    opening_hours: Option<OpeningHours>,
    #[serde(default)]
    photos: Vec<Photo>,
    #[serde(default)]
    reviews: Vec<Review>,
}

#[derive(Deserialize)]
struct OpeningHours {
    #[serde(default)]
    weekday_text: Vec<String>,
}

#[derive(Deserialize)]
struct Photo {
    photo_reference: String,
}

#[derive(Deserialize)]
struct Review {
    text: Option<String>,
}

impl GooglePlacesClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            last_request: Mutex::new(Instant::now() - MIN_REQUEST_INTERVAL),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
        }
        *last = Instant::now();
    }

    async fn fetch(&self, place_id: &str) -> Result<PlaceDetails, ProviderError> {
        self.rate_limit().await;

        let url = format!(
            "{}/details/json?place_id={}&fields={}&key={}",
            self.base_url,
            urlencoding::encode(place_id),
            DETAIL_FIELDS,
            urlencoding::encode(&self.api_key)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if status.as_u16() == 404 {
            return Err(ProviderError::NotFound(place_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: DetailsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidData(format!("Unparseable details: {}", e)))?;

        match body.status.as_str() {
            "OK" => {}
            "OVER_QUERY_LIMIT" => return Err(ProviderError::RateLimited),
            "NOT_FOUND" | "ZERO_RESULTS" | "INVALID_REQUEST" => {
                return Err(ProviderError::NotFound(place_id.to_string()))
            }
            other => {
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message: format!(
                        "{}: {}",
                        other,
                        body.error_message.unwrap_or_default()
                    ),
                })
            }
        }

        let result = body
            .result
            .ok_or_else(|| ProviderError::InvalidData("OK status without result".to_string()))?;
        let name = result
            .name
            .ok_or_else(|| ProviderError::InvalidData("details missing name".to_string()))?;

        Ok(PlaceDetails {
            place_id: place_id.to_string(),
            name,
            formatted_address: result.formatted_address,
            phone: result.formatted_phone_number,
            website: result.website,
            maps_url: result.url,
            rating: result.rating,
            user_ratings_total: result.user_ratings_total,
            opening_hours: result
                .opening_hours
                .map(|h| h.weekday_text)
                .unwrap_or_default(),
            photo_refs: result.photos.into_iter().map(|p| p.photo_reference).collect(),
            review_snippets: result
                .reviews
                .into_iter()
                .filter_map(|r| r.text)
                .filter(|t| !t.trim().is_empty())
                .collect(),
        })
    }
}

#[async_trait]
impl LocationDetailsProvider for GooglePlacesClient {
    fn name(&self) -> &str {
        "places"
    }

    async fn fetch_details(&self, place_id: &str) -> Result<PlaceDetails, ProviderError> {
        let result = self.fetch(place_id).await;
        debug!("Places lookup for {} done, ok: {}", place_id, result.is_ok());
        result
    }
}
