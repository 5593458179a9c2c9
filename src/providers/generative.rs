//! Content generator backed by an OpenAI-compatible chat completions API.
//!
//! A single consolidated prompt asks for every section at once and the model
//! answers with one JSON object, so each salon costs exactly one call.

use super::error::ProviderError;
use super::models::{GeneratedContent, PlaceDetails};
use crate::location_store::SalonRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You write concise, factual content for a hair and beauty salon \
directory. Only use the facts you are given. Answer with a single JSON object and nothing else.";

/// Produces the generated sections of a salon page.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Provider name, used as the cost ledger key.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        salon: &SalonRecord,
        details: &PlaceDetails,
    ) -> Result<GeneratedContent, ProviderError>;
}

pub struct OpenAiContentGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiContentGenerator {
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "https://api.openai.com/v1").
    /// * `model` - Model to use (e.g., "gpt-4o-mini").
    /// * `api_key` - Optional bearer token.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            timeout,
        }
    }
}

/// Build the user prompt for one salon from its record and fetched details.
pub fn build_prompt(salon: &SalonRecord, details: &PlaceDetails) -> String {
    let mut prompt = format!(
        "Salon: {}\nAddress: {}\nCity: {}, {}\nRating: {:.1} from {} reviews\n",
        details.name,
        details
            .formatted_address
            .as_deref()
            .unwrap_or(salon.address.as_str()),
        salon.city,
        salon.state,
        details.rating.unwrap_or(salon.rating),
        details.user_ratings_total.unwrap_or(salon.review_count),
    );

    if !details.opening_hours.is_empty() {
        prompt.push_str("Opening hours:\n");
        for line in &details.opening_hours {
            prompt.push_str(&format!("- {}\n", line));
        }
    }
    if !details.review_snippets.is_empty() {
        prompt.push_str("Customer reviews:\n");
        for review in &details.review_snippets {
            prompt.push_str(&format!("- {}\n", review));
        }
    }

    prompt.push_str(
        "\nReturn JSON with exactly these keys:\n\
         \"about\": two or three sentences describing the salon,\n\
         \"review_insights\": {\"summary\": string, \"highlights\": [string], \"concerns\": [string]},\n\
         \"faq\": a list of 3 to 5 {\"question\": string, \"answer\": string},\n\
         \"parking_guide\": practical parking advice for the address,\n\
         \"best_times\": when to visit, based on the opening hours.\n",
    );
    prompt
}

/// Extract the JSON object from a model reply, tolerating markdown fences.
fn parse_content(raw: &str) -> Result<GeneratedContent, ProviderError> {
    let trimmed = raw.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => {
            return Err(ProviderError::InvalidData(
                "Model reply contains no JSON object".to_string(),
            ))
        }
    };

    let content: GeneratedContent = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidData(format!("Unparseable generated content: {}", e)))?;
    content.validate().map_err(ProviderError::InvalidData)?;
    Ok(content)
}

#[async_trait]
impl ContentGenerator for OpenAiContentGenerator {
    fn name(&self) -> &str {
        "generative"
    }

    async fn generate(
        &self,
        salon: &SalonRecord,
        details: &PlaceDetails,
    ) -> Result<GeneratedContent, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(salon, details),
                },
            ],
            temperature: 0.4,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        };

        debug!(model = %self.model, place_id = %salon.place_id, "Requesting generated content");

        let mut req_builder = self.client.post(&url).json(&request).timeout(self.timeout);
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidData(format!("Failed to parse completion response: {}", e))
        })?;
        let raw = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidData("Empty completion".to_string()))?;

        parse_content(&raw)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}
