use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use reqwest::Client;

use crate::{
    config::GatewayConfig,
    model::{ModelStreamClient, OpenAiStreamClient},
    prompt::PromptAssembler,
    retrieval::{HttpRetrievalClient, RetrievalClient},
    streaming::StreamMultiplexer,
};

/// Process-wide shared state.
///
/// Built once at startup, `Arc`-shared into every request task, and
/// read-only afterwards. Per-request state lives in `StreamSession`.
pub struct AppContext {
    pub client: Client,
    pub config: GatewayConfig,
    pub retrieval: Arc<dyn RetrievalClient>,
    pub model: Arc<dyn ModelStreamClient>,
    pub multiplexer: Arc<StreamMultiplexer>,
}

impl AppContext {
    /// Wire up the HTTP clients and pipeline from configuration.
    pub fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.model.connect_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        let retrieval: Arc<dyn RetrievalClient> =
            Arc::new(HttpRetrievalClient::new(client.clone(), &config.retrieval));
        let model: Arc<dyn ModelStreamClient> =
            Arc::new(OpenAiStreamClient::new(client.clone(), &config.model));

        Ok(Self::with_clients(config, client, retrieval, model))
    }

    /// Wire up with injected clients; tests use this to swap in mocks.
    pub fn with_clients(
        config: GatewayConfig,
        client: Client,
        retrieval: Arc<dyn RetrievalClient>,
        model: Arc<dyn ModelStreamClient>,
    ) -> Self {
        let assembler = PromptAssembler::new(&config.prompt);
        let multiplexer = Arc::new(StreamMultiplexer::new(
            retrieval.clone(),
            model.clone(),
            assembler,
            config.retrieval.top_k,
        ));

        Self {
            client,
            config,
            retrieval,
            model,
            multiplexer,
        }
    }
}
