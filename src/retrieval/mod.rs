//! Passage retrieval against an external vector store.

mod http;

pub use http::HttpRetrievalClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A passage returned by the retrieval backend for one query.
///
/// Owned by the request that retrieved it; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedPassage {
    /// Opaque identifier of the source document.
    pub source_id: String,
    /// Passage text, fed verbatim into the prompt.
    pub text: String,
    /// Relevance score as reported by the store (higher is better).
    pub score: f32,
}

/// Retrieval errors
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Retrieval request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Failed to reach retrieval backend: {reason}")]
    Unreachable { reason: String },

    #[error("Retrieval backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode retrieval response: {reason}")]
    Decode { reason: String },
}

impl RetrievalError {
    /// Whether a later identical call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::Timeout { .. } | RetrievalError::Unreachable { .. } => true,
            RetrievalError::Status { status, .. } => *status >= 500,
            RetrievalError::Decode { .. } => false,
        }
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured timeout here; callers
            // log the configured value alongside.
            RetrievalError::Timeout { timeout_secs: 0 }
        } else if err.is_decode() {
            RetrievalError::Decode {
                reason: err.to_string(),
            }
        } else {
            RetrievalError::Unreachable {
                reason: err.to_string(),
            }
        }
    }
}

/// Result type for retrieval operations
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Client against a vector/document store.
///
/// Implementations share their connection pool across requests and hold no
/// per-request state.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    /// Fetch the `top_k` passages most relevant to `query`.
    async fn search(&self, query: &str, top_k: usize) -> RetrievalResult<Vec<RetrievedPassage>>;
}
