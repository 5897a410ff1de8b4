//! REST threshold store.
//!
//! - `GET  {endpoint}/thresholds` returns `{ "<node>": Threshold, ... }`
//! - `PUT  {endpoint}/thresholds/{node}` with a `Threshold` body saves one node
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleetwatch::store::{HttpThresholdStore, ThresholdStore};
//!
//! # tokio_test::block_on(async {
//! let store = HttpThresholdStore::builder()
//!     .endpoint("http://dashboard.local:8000/api")
//!     .build()
//!     .expect("valid client settings");
//!
//! let thresholds = store.fetch_all().await.unwrap();
//! println!("{} nodes with custom limits", thresholds.len());
//! # });
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::ThresholdStore;
use crate::data::{NodeId, Threshold};
use crate::error::StoreError;

/// Threshold store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpThresholdStore {
    client: Client,
    endpoint: String,
}

impl HttpThresholdStore {
    /// Create a new builder for configuring the store.
    pub fn builder() -> HttpThresholdStoreBuilder {
        HttpThresholdStoreBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn collection_url(&self) -> String {
        format!("{}/thresholds", self.endpoint)
    }

    fn node_url(&self, id: &NodeId) -> String {
        format!("{}/thresholds/{}", self.endpoint, urlencoded(id.as_str()))
    }
}

#[async_trait]
impl ThresholdStore for HttpThresholdStore {
    async fn fetch_all(&self) -> Result<HashMap<NodeId, Threshold>, StoreError> {
        let response = self.client.get(self.collection_url()).send().await?;

        if !response.status().is_success() {
            return Err(StoreError::Http(format!(
                "API returned status {}",
                response.status()
            )));
        }

        let thresholds: HashMap<NodeId, Threshold> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        Ok(thresholds)
    }

    async fn save(&self, id: &NodeId, threshold: &Threshold) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.node_url(id))
            .json(threshold)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Rejected(body))
            }
            status => Err(StoreError::Http(format!("API returned status {}", status))),
        }
    }

    fn description(&self) -> &str {
        &self.endpoint
    }
}

/// Builder for [`HttpThresholdStore`].
#[derive(Debug, Default)]
pub struct HttpThresholdStoreBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl HttpThresholdStoreBuilder {
    /// Set the API base URL (e.g., "http://localhost:8000/api").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the store.
    pub fn build(self) -> Result<HttpThresholdStore, StoreError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:8000/api".to_string());

        Ok(HttpThresholdStore {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

// Node identities are addresses; only path separators and IPv6 colons need escaping
fn urlencoded(s: &str) -> String {
    s.replace('%', "%25").replace('/', "%2F").replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let store = HttpThresholdStore::builder().build().unwrap();
        assert_eq!(store.endpoint(), "http://localhost:8000/api");
        assert_eq!(store.collection_url(), "http://localhost:8000/api/thresholds");
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let store = HttpThresholdStore::builder()
            .endpoint("http://dash.local/api/")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        assert_eq!(
            store.node_url(&NodeId::from("10.0.0.7")),
            "http://dash.local/api/thresholds/10.0.0.7"
        );
    }

    #[test]
    fn test_urlencoded() {
        assert_eq!(urlencoded("10.0.0.7"), "10.0.0.7");
        assert_eq!(urlencoded("fe80::1"), "fe80%3A%3A1");
        assert_eq!(urlencoded("a/b"), "a%2Fb");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_error() {
        let store = HttpThresholdStore::builder()
            .endpoint("http://127.0.0.1:1")
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        assert!(store.fetch_all().await.is_err());
        assert!(store
            .save(&NodeId::from("10.0.0.1"), &Threshold::default())
            .await
            .is_err());
    }
}
