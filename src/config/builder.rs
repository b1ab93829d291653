use super::{ConfigResult, GatewayConfig, ModelConfig, PromptConfig, RetrievalConfig};

/// Builder for GatewayConfig that wraps the config itself
/// This eliminates field duplication and stays in sync automatically
#[derive(Debug, Clone)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            retrieval: RetrievalConfig {
                endpoint: String::new(),
                api_key: None,
                top_k: 5,
                timeout_secs: 3,
            },
            model: ModelConfig {
                endpoint: String::new(),
                model: String::new(),
                api_key: None,
                connect_timeout_secs: 10,
            },
            prompt: PromptConfig {
                context_window_tokens: 8192,
                completion_reserve_tokens: 1024,
                system_preamble: None,
            },
            max_payload_size: 2 * 1024 * 1024,
            request_timeout_secs: 120,
            max_tokens_limit: 4096,
            shutdown_grace_period_secs: 30,
            api_key: None,
            cors_allowed_origins: Vec::new(),
            request_id_headers: None,
            log_dir: None,
            log_level: None,
        }
    }
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Create a builder from an existing configuration (takes ownership)
    pub fn from_config(config: GatewayConfig) -> Self {
        Self { config }
    }

    // ==================== Server Setters ====================

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn max_tokens_limit(mut self, limit: u32) -> Self {
        self.config.max_tokens_limit = limit;
        self
    }

    pub fn shutdown_grace_period_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_period_secs = secs;
        self
    }

    pub fn cors_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors_allowed_origins = origins;
        self
    }

    pub fn maybe_api_key(mut self, api_key: Option<&String>) -> Self {
        self.config.api_key = api_key.cloned();
        self
    }

    pub fn maybe_request_id_headers(mut self, headers: Option<Vec<String>>) -> Self {
        self.config.request_id_headers = headers;
        self
    }

    pub fn maybe_log_dir(mut self, log_dir: Option<&String>) -> Self {
        self.config.log_dir = log_dir.cloned();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = Some(level.into());
        self
    }

    // ==================== Retrieval Setters ====================

    pub fn retrieval_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.retrieval.endpoint = endpoint.into();
        self
    }

    pub fn maybe_retrieval_api_key(mut self, api_key: Option<&String>) -> Self {
        self.config.retrieval.api_key = api_key.cloned();
        self
    }

    pub fn retrieval_top_k(mut self, top_k: usize) -> Self {
        self.config.retrieval.top_k = top_k;
        self
    }

    pub fn retrieval_timeout_secs(mut self, secs: u64) -> Self {
        self.config.retrieval.timeout_secs = secs;
        self
    }

    // ==================== Model Setters ====================

    pub fn model_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.model.endpoint = endpoint.into();
        self
    }

    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.config.model.model = model.into();
        self
    }

    pub fn maybe_model_api_key(mut self, api_key: Option<&String>) -> Self {
        self.config.model.api_key = api_key.cloned();
        self
    }

    pub fn model_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model.connect_timeout_secs = secs;
        self
    }

    // ==================== Prompt Setters ====================

    pub fn context_window_tokens(mut self, tokens: usize) -> Self {
        self.config.prompt.context_window_tokens = tokens;
        self
    }

    pub fn completion_reserve_tokens(mut self, tokens: usize) -> Self {
        self.config.prompt.completion_reserve_tokens = tokens;
        self
    }

    pub fn maybe_system_preamble(mut self, preamble: Option<&String>) -> Self {
        self.config.prompt.system_preamble = preamble.cloned();
        self
    }

    /// Validate and produce the final configuration
    pub fn build(self) -> ConfigResult<GatewayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Produce the configuration without validation (tests only)
    pub fn build_unchecked(self) -> GatewayConfig {
        self.config
    }
}
