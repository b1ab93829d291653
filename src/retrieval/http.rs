use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RetrievalClient, RetrievalError, RetrievalResult, RetrievedPassage};
use crate::config::RetrievalConfig;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    passages: Vec<RetrievedPassage>,
}

/// Retrieval client speaking the vector store's JSON search API.
pub struct HttpRetrievalClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpRetrievalClient {
    pub fn new(client: Client, config: &RetrievalConfig) -> Self {
        Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn search(&self, query: &str, top_k: usize) -> RetrievalResult<Vec<RetrievedPassage>> {
        let url = format!("{}/search", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&SearchRequest { query, top_k });

        if let Some(api_key) = &self.api_key {
            request = request.header("X-API-Token", api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                RetrievalError::from(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Status { status, body });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| RetrievalError::Decode {
            reason: e.to_string(),
        })?;

        debug!(
            passages = parsed.passages.len(),
            top_k, "Retrieval query completed"
        );

        Ok(parsed.passages)
    }
}
