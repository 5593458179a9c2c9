//! Metered external providers used to enrich a salon.

mod error;
mod generative;
mod models;
mod places;

pub use error::ProviderError;
pub use generative::{build_prompt, ContentGenerator, OpenAiContentGenerator};
pub use models::{FaqEntry, GeneratedContent, PlaceDetails, ReviewInsights};
pub use places::{GooglePlacesClient, LocationDetailsProvider, GOOGLE_PLACES_API_BASE};
