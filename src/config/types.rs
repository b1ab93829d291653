use serde::{Deserialize, Serialize};
use url::Url;

use super::{ConfigError, ConfigResult};

/// Main gateway configuration
///
/// Read-only after startup; shared by every request task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Retrieval backend configuration
    pub retrieval: RetrievalConfig,
    /// Model backend configuration
    pub model: ModelConfig,
    /// Prompt assembly configuration
    pub prompt: PromptConfig,
    /// Maximum request payload size in bytes
    pub max_payload_size: usize,
    /// Per-request pipeline timeout (retrieval + prompt + streaming) in seconds
    pub request_timeout_secs: u64,
    /// Server-side ceiling on `options.maxTokens`
    pub max_tokens_limit: u32,
    /// Grace period for in-flight streams during shutdown, in seconds
    pub shutdown_grace_period_secs: u64,
    /// Static bearer key required on the streaming route (None = open)
    pub api_key: Option<String>,
    /// CORS allowed origins (empty = allow any)
    pub cors_allowed_origins: Vec<String>,
    /// Custom request ID headers to check (defaults to common headers)
    pub request_id_headers: Option<Vec<String>>,
    /// Log directory (None = stdout only)
    pub log_dir: Option<String>,
    /// Log level (None = info)
    pub log_level: Option<String>,
}

/// Retrieval backend (vector store) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the retrieval service
    pub endpoint: String,
    /// API key sent as `X-API-Token` (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Number of passages requested per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Per-call timeout in seconds
    #[serde(default = "default_retrieval_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_top_k() -> usize {
    5
}

fn default_retrieval_timeout_secs() -> u64 {
    3
}

/// Model backend configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the OpenAI-compatible completion API
    pub endpoint: String,
    /// Model identifier sent upstream
    pub model: String,
    /// Bearer key for the model backend (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Connect timeout in seconds; the streaming body itself is not
    /// time-limited here (the per-request pipeline timeout covers it)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

// Keep the model API key out of Debug output.
impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Prompt assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Model context window, in tokens
    #[serde(default = "default_context_window_tokens")]
    pub context_window_tokens: usize,
    /// Tokens reserved for the completion; the prompt budget is
    /// `context_window_tokens - completion_reserve_tokens`
    #[serde(default = "default_completion_reserve_tokens")]
    pub completion_reserve_tokens: usize,
    /// System preamble prepended to every prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_preamble: Option<String>,
}

fn default_context_window_tokens() -> usize {
    8192
}

fn default_completion_reserve_tokens() -> usize {
    1024
}

impl PromptConfig {
    /// Token budget available to the assembled prompt.
    pub fn prompt_budget(&self) -> usize {
        self.context_window_tokens
            .saturating_sub(self.completion_reserve_tokens)
    }
}

impl GatewayConfig {
    pub fn builder() -> super::GatewayConfigBuilder {
        super::GatewayConfigBuilder::new()
    }

    /// Validate the assembled configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_endpoint("retrieval.endpoint", &self.retrieval.endpoint)?;
        validate_endpoint("model.endpoint", &self.model.endpoint)?;

        if self.model.model.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "model.model".to_string(),
            });
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.top_k".to_string(),
                value: "0".to_string(),
                reason: "must request at least one passage".to_string(),
            });
        }

        if self.max_tokens_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tokens_limit".to_string(),
                value: "0".to_string(),
                reason: "must allow at least one completion token".to_string(),
            });
        }

        if self.prompt.prompt_budget() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "prompt.completion_reserve_tokens".to_string(),
                value: self.prompt.completion_reserve_tokens.to_string(),
                reason: "completion reserve consumes the entire context window".to_string(),
            });
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "a zero pipeline timeout would cancel every request".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_endpoint(field: &str, endpoint: &str) -> ConfigResult<()> {
    if endpoint.is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        });
    }

    let url = Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        value: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: endpoint.to_string(),
            reason: "scheme must be http or https".to_string(),
        });
    }

    Ok(())
}
