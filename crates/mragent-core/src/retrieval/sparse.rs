use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use super::{RawHit, SearchBackend};
use crate::MragentError;

/// Learned-sparse retrieval served over HTTP: `POST {query, top_k, threshold}` → `[{id, text}]`.
pub struct SparseHttpBackend {
    client: Client,
    url: String,
    top_k: usize,
    threshold: f32,
}

#[derive(Serialize)]
struct SearchPayload<'a> {
    query: &'a str,
    top_k: usize,
    threshold: f32,
}

impl SparseHttpBackend {
    pub fn new(
        url: impl Into<String>,
        top_k: usize,
        threshold: f32,
        timeout: Duration,
    ) -> Result<Self, MragentError> {
        let client = Client::builder().timeout(timeout).build().map_err(|err| {
            MragentError::InvalidConfiguration(format!("failed to build http client: {err}"))
        })?;
        Ok(Self {
            client,
            url: url.into(),
            top_k,
            threshold,
        })
    }
}

#[async_trait]
impl SearchBackend for SparseHttpBackend {
    async fn search(&self, query: &str, top_k: usize) -> Option<Vec<RawHit>> {
        let payload = SearchPayload {
            query,
            top_k,
            threshold: self.threshold,
        };
        let response = match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %self.url, error = %err, "sparse retriever request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(url = %self.url, status = %response.status(), "sparse retriever returned error status");
            return None;
        }
        match response.json::<Vec<RawHit>>().await {
            Ok(hits) => Some(hits),
            Err(err) => {
                warn!(url = %self.url, error = %err, "sparse retriever returned undecodable payload");
                None
            }
        }
    }

    fn default_top_k(&self) -> usize {
        self.top_k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_service_is_reported_as_no_results() {
        // Port 9 (discard) on localhost is closed in test environments.
        let backend =
            SparseHttpBackend::new("http://127.0.0.1:9/search", 10, 0.0, Duration::from_secs(2))
                .unwrap();
        assert!(backend.search("anything", 5).await.is_none());
        assert_eq!(backend.default_top_k(), 10);
    }
}
