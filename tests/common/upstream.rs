//! Stub Places and chat completion APIs
//!
//! The real provider clients talk to these over HTTP, so end-to-end tests
//! exercise the whole request path without leaving the machine.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
pub struct UpstreamStub {
    places_calls: AtomicUsize,
    llm_calls: AtomicUsize,
    places_delay_ms: AtomicU64,
    failing_place_ids: Mutex<HashSet<String>>,
}

impl UpstreamStub {
    pub fn places_calls(&self) -> usize {
        self.places_calls.load(Ordering::SeqCst)
    }

    pub fn llm_calls(&self) -> usize {
        self.llm_calls.load(Ordering::SeqCst)
    }

    /// Slow down every details call, to keep a job running for a while
    pub fn set_places_delay(&self, delay: Duration) {
        self.places_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make details calls for `place_id` fail with a 500 until cleared
    pub fn fail_place(&self, place_id: &str) {
        self.failing_place_ids
            .lock()
            .unwrap()
            .insert(place_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_place_ids.lock().unwrap().clear();
    }
}

#[derive(Deserialize)]
struct DetailsQuery {
    place_id: String,
}

async fn place_details(
    State(stub): State<Arc<UpstreamStub>>,
    Query(query): Query<DetailsQuery>,
) -> Response {
    stub.places_calls.fetch_add(1, Ordering::SeqCst);
    let delay = stub.places_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if stub
        .failing_place_ids
        .lock()
        .unwrap()
        .contains(&query.place_id)
    {
        return (StatusCode::INTERNAL_SERVER_ERROR, "backend unavailable").into_response();
    }

    Json(json!({
        "status": "OK",
        "result": {
            "name": format!("Salon {}", query.place_id),
            "formatted_address": "100 Main St",
            "formatted_phone_number": "+1 512 555 0100",
            "website": "https://example.com",
            "rating": 4.6,
            "user_ratings_total": 180,
            "opening_hours": { "weekday_text": ["Monday: 9:00 AM – 6:00 PM"] },
            "photos": [{ "photo_reference": "photo-1" }],
            "reviews": [{ "text": "Lovely staff and a great cut." }]
        }
    }))
    .into_response()
}

async fn chat_completions(State(stub): State<Arc<UpstreamStub>>) -> impl IntoResponse {
    stub.llm_calls.fetch_add(1, Ordering::SeqCst);
    let content = json!({
        "about": "A cozy salon known for precise cuts.",
        "review_insights": {
            "summary": "Clients praise the stylists.",
            "highlights": ["friendly staff"],
            "concerns": []
        },
        "faq": [{ "question": "Do they accept walk-ins?", "answer": "Yes, on weekdays." }],
        "parking_guide": "Street parking on Main St.",
        "best_times": "Weekday mornings."
    });
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }]
    }))
}

/// Serve the stub on a random port, returning its base URL
pub async fn spawn_upstream(stub: Arc<UpstreamStub>) -> String {
    let app = Router::new()
        .route("/places/details/json", get(place_details))
        .route("/llm/chat/completions", post(chat_completions))
        .with_state(stub);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind upstream stub");
    let addr = listener.local_addr().expect("Failed to get stub address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Upstream stub failed");
    });
    format!("http://{}", addr)
}
