use clap::Parser;
use raggate::{
    config::{ConfigResult, GatewayConfig},
    server,
};

#[derive(Parser, Debug)]
#[command(name = "raggate", version)]
#[command(about = "Streaming retrieval-augmented chat completions gateway")]
#[command(long_about = r#"
raggate - streaming retrieval-augmented chat completions gateway

Serves POST /v1/chat/completions/stream: retrieves passages from a vector
store, assembles a token-budgeted prompt, and streams the model's answer
back as Server-Sent Events.

Examples:
  # Minimal
  raggate --retrieval-endpoint http://store:9200 \
    --model-endpoint http://model:8000 --model my-model

  # With auth and a tighter context budget
  raggate --retrieval-endpoint http://store:9200 \
    --model-endpoint https://api.example.com --model my-model \
    --model-api-key $MODEL_KEY --api-key $GATEWAY_KEY \
    --context-window-tokens 4096 --completion-reserve-tokens 512
"#)]
struct CliArgs {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Base URL of the retrieval (vector store) service
    #[arg(long, env = "RAGGATE_RETRIEVAL_ENDPOINT")]
    retrieval_endpoint: String,

    #[arg(long, env = "RAGGATE_RETRIEVAL_API_KEY")]
    retrieval_api_key: Option<String>,

    #[arg(long, default_value_t = 5)]
    retrieval_top_k: usize,

    #[arg(long, default_value_t = 3)]
    retrieval_timeout_secs: u64,

    /// Base URL of the OpenAI-compatible model backend
    #[arg(long, env = "RAGGATE_MODEL_ENDPOINT")]
    model_endpoint: String,

    /// Model identifier sent upstream
    #[arg(long, env = "RAGGATE_MODEL")]
    model: String,

    #[arg(long, env = "RAGGATE_MODEL_API_KEY")]
    model_api_key: Option<String>,

    #[arg(long, default_value_t = 10)]
    model_connect_timeout_secs: u64,

    #[arg(long, default_value_t = 8192)]
    context_window_tokens: usize,

    #[arg(long, default_value_t = 1024)]
    completion_reserve_tokens: usize,

    /// System preamble prepended to every prompt
    #[arg(long)]
    system_preamble: Option<String>,

    /// Server-side ceiling on the per-request maxTokens option
    #[arg(long, default_value_t = 4096)]
    max_tokens_limit: u32,

    #[arg(long, default_value_t = 2097152)]
    max_payload_size: usize,

    /// Per-request pipeline timeout (retrieval + prompt + streaming)
    #[arg(long, default_value_t = 120)]
    request_timeout_secs: u64,

    /// Grace period in seconds to wait for in-flight streams during shutdown
    #[arg(long, default_value_t = 30)]
    shutdown_grace_period_secs: u64,

    /// Static bearer key required on the streaming route
    #[arg(long, env = "RAGGATE_API_KEY")]
    api_key: Option<String>,

    #[arg(long, num_args = 0..)]
    cors_allowed_origins: Vec<String>,

    #[arg(long, num_args = 0..)]
    request_id_headers: Vec<String>,

    #[arg(long)]
    log_dir: Option<String>,

    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,
}

impl CliArgs {
    fn to_gateway_config(&self) -> ConfigResult<GatewayConfig> {
        GatewayConfig::builder()
            .host(&self.host)
            .port(self.port)
            .retrieval_endpoint(&self.retrieval_endpoint)
            .maybe_retrieval_api_key(self.retrieval_api_key.as_ref())
            .retrieval_top_k(self.retrieval_top_k)
            .retrieval_timeout_secs(self.retrieval_timeout_secs)
            .model_endpoint(&self.model_endpoint)
            .model_name(&self.model)
            .maybe_model_api_key(self.model_api_key.as_ref())
            .model_connect_timeout_secs(self.model_connect_timeout_secs)
            .context_window_tokens(self.context_window_tokens)
            .completion_reserve_tokens(self.completion_reserve_tokens)
            .maybe_system_preamble(self.system_preamble.as_ref())
            .max_tokens_limit(self.max_tokens_limit)
            .max_payload_size(self.max_payload_size)
            .request_timeout_secs(self.request_timeout_secs)
            .shutdown_grace_period_secs(self.shutdown_grace_period_secs)
            .maybe_api_key(self.api_key.as_ref())
            .cors_allowed_origins(self.cors_allowed_origins.clone())
            .maybe_request_id_headers(
                (!self.request_id_headers.is_empty()).then(|| self.request_id_headers.clone()),
            )
            .maybe_log_dir(self.log_dir.as_ref())
            .log_level(&self.log_level)
            .build()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config = args.to_gateway_config()?;

    println!("raggate starting...");
    println!("Host: {}:{}", config.host, config.port);
    println!("Model backend: {}", config.model.endpoint);
    println!("Retrieval backend: {}", config.retrieval.endpoint);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move { server::startup(config).await })?;
    Ok(())
}
