//! HTTP client abstraction for outbound notifications.
//!
//! Notifiers talk to webhooks through [`HttpClient`] rather than reqwest
//! directly, so tests can swap in a mock and never touch the network.
//!
//! # Example Usage:
//! ``
//! use ksbot_core::http::{HttpClient, DefaultHttpClient};
//!
//! let client: Arc<dyn HttpClient> = Arc::new(DefaultHttpClient::new());
//! let status = client.post_json(url, &serde_json::json!({ "content": "hi" })).await?;
//! ``

use std::time::Duration;

use async_trait::async_trait;
use reqwest;
use crate::Error;

/// Minimal JSON-over-HTTP surface the notifiers need.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POSTs `body` as JSON and returns the HTTP status code.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, Error>;
}

#[derive(Clone)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
}

impl DefaultHttpClient {
    /// Client with the 10 second request timeout used for webhook calls.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for DefaultHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<u16, Error> {
        let response = self.client
            .post(url)
            .json(body)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}
