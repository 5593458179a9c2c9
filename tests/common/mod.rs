//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer};
//!
//! #[tokio::test]
//! async fn test_progress_starts_idle() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     assert_eq!(client.get_progress().await["state"], "idle");
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;
mod upstream;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
#[allow(unused_imports)]
pub use server::{test_settings, TestServer};
#[allow(unused_imports)]
pub use upstream::UpstreamStub;
