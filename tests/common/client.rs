//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per admin endpoint. When API routes or
//! request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

const ADMIN: &str = "/v1/admin/enrichment";

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, ADMIN, path)
    }

    async fn post_empty(&self, path: &str) -> Response {
        self.client
            .post(self.admin_url(path))
            .send()
            .await
            .expect("Request failed")
    }

    async fn post_json(&self, path: &str, body: Value) -> Response {
        self.client
            .post(self.admin_url(path))
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.admin_url(path))
            .send()
            .await
            .expect("Request failed")
    }

    // =========================================================================
    // Locations
    // =========================================================================

    pub async fn get_states(&self) -> Response {
        self.get("/states").await
    }

    pub async fn get_cities(&self, state: &str) -> Response {
        self.get(&format!("/states/{}/cities", urlencoding::encode(state)))
            .await
    }

    pub async fn get_salons(&self, state: &str, city: &str, tier: Option<&str>) -> Response {
        let mut path = format!(
            "/states/{}/cities/{}/salons",
            urlencoding::encode(state),
            urlencoding::encode(city)
        );
        if let Some(tier) = tier {
            path.push_str(&format!("?tier={}", urlencoding::encode(tier)));
        }
        self.get(&path).await
    }

    // =========================================================================
    // Job control
    // =========================================================================

    pub async fn get_progress(&self) -> Value {
        let response = self.get("/progress").await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        response.json().await.expect("Progress is not JSON")
    }

    pub async fn start(&self, body: Value) -> Response {
        self.post_json("/start", body).await
    }

    pub async fn start_explicit(&self, place_ids: &[&str], force_refresh: bool) -> Response {
        self.post_json(
            "/start-explicit",
            json!({ "place_ids": place_ids, "force_refresh": force_refresh }),
        )
        .await
    }

    pub async fn pause(&self) -> Response {
        self.post_empty("/pause").await
    }

    pub async fn resume(&self) -> Response {
        self.post_empty("/resume").await
    }

    pub async fn retry_failed(&self) -> Response {
        self.post_empty("/retry-failed").await
    }

    pub async fn force_retry(&self, place_ids: &[&str]) -> Response {
        self.post_json("/force-retry", json!({ "place_ids": place_ids }))
            .await
    }

    pub async fn reset(&self) -> Response {
        self.post_empty("/reset").await
    }

    /// Polls progress until the job reaches `state`, returning that snapshot
    pub async fn wait_for_state(&self, state: &str) -> Value {
        self.wait_for_progress(|p| p["state"] == state).await
    }

    /// Polls progress until `done` holds for the snapshot
    pub async fn wait_for_progress(&self, done: impl Fn(&Value) -> bool) -> Value {
        let start = std::time::Instant::now();
        loop {
            let progress = self.get_progress().await;
            if done(&progress) {
                return progress;
            }
            if start.elapsed() > Duration::from_millis(JOB_WAIT_TIMEOUT_MS) {
                panic!("Job progress did not settle in time: {}", progress);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // =========================================================================
    // Review index
    // =========================================================================

    pub async fn rebuild_review_index(&self) -> Response {
        self.post_empty("/review-index/rebuild").await
    }

    pub async fn get_review_index_stats(&self) -> Response {
        self.get("/review-index/stats").await
    }

    // =========================================================================
    // Misc
    // =========================================================================

    pub async fn get_metrics(&self) -> String {
        self.client
            .get(format!("{}/metrics", self.base_url))
            .send()
            .await
            .expect("Request failed")
            .text()
            .await
            .expect("Metrics are not text")
    }
}
