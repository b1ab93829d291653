//! OpenAI-compatible streaming completion client.
//!
//! Sends a `stream: true` chat completion request and relays the upstream
//! SSE frames (`data: {chunk}` / `data: [DONE]`) into [`TokenEvent`]s
//! through a bounded channel.

use async_trait::async_trait;
use futures_util::StreamExt;
use rag_protocol::{ChatOptions, FinishReason};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ModelResult, ModelStreamClient, ModelStreamError, TokenEvent, TokenStream};
use crate::config::ModelConfig;
use crate::prompt::AssembledPrompt;

/// Channel capacity between the relay task and the consumer.
const TOKEN_CHANNEL_SIZE: usize = 32;

/// Maximum SSE buffer size (1 MB) to protect against an upstream that
/// sends data without frame delimiters.
const MAX_SSE_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: [PayloadMessage<'a>; 1],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct PayloadMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
}

/// Streaming client for an OpenAI-compatible `/v1/chat/completions` API.
pub struct OpenAiStreamClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiStreamClient {
    /// The client's connect timeout is configured on the shared
    /// `reqwest::Client` (see `AppContext`), not per request.
    pub fn new(client: Client, config: &ModelConfig) -> Self {
        Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl ModelStreamClient for OpenAiStreamClient {
    async fn stream(
        &self,
        prompt: &AssembledPrompt,
        options: &ChatOptions,
    ) -> ModelResult<TokenStream> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let payload = CompletionPayload {
            model: &self.model,
            messages: [PayloadMessage {
                role: "user",
                content: &prompt.text,
            }],
            stream: true,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let mut request = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&payload);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelStreamError::Connect {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelStreamError::Status { status, body });
        }

        debug!(prompt_tokens = prompt.token_count, "Model stream opened");

        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_SIZE);
        let relay = tokio::spawn(relay_stream(response, tx));

        Ok(TokenStream::new(rx, relay))
    }
}

/// Read the upstream SSE byte stream and forward token events.
///
/// Exits as soon as the receiver is dropped so an abandoned stream does not
/// hold the upstream connection open.
async fn relay_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<ModelResult<TokenEvent>>,
) {
    let mut upstream = response.bytes_stream();
    let mut buffer = String::new();
    let mut parser = ChunkParser::new();

    loop {
        let chunk_result = tokio::select! {
            _ = tx.closed() => return,
            chunk = upstream.next() => chunk,
        };

        let chunk = match chunk_result {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let _ = tx
                    .send(Err(ModelStreamError::Transport {
                        reason: e.to_string(),
                    }))
                    .await;
                return;
            }
            // Upstream closed without a [DONE] sentinel.
            None => {
                if !parser.finished {
                    let _ = tx
                        .send(Err(ModelStreamError::Protocol {
                            reason: "stream ended without terminal event".to_string(),
                        }))
                        .await;
                }
                return;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(&chunk));

        if buffer.len() > MAX_SSE_BUFFER_SIZE {
            let _ = tx
                .send(Err(ModelStreamError::Protocol {
                    reason: format!(
                        "SSE buffer exceeded maximum size ({} bytes)",
                        MAX_SSE_BUFFER_SIZE
                    ),
                }))
                .await;
            return;
        }

        // Process complete SSE frames (delimited by double newline)
        while let Some(frame_end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..frame_end + 2).collect();

            for event in parser.parse_frame(&frame) {
                let terminal = matches!(event, Ok(TokenEvent::Done(_)) | Err(_));
                if tx.send(event).await.is_err() {
                    return;
                }
                if terminal {
                    return;
                }
            }
        }
    }
}

/// Parses OpenAI stream frames into token events.
struct ChunkParser {
    /// Last finish_reason seen in a chunk; reported with the `[DONE]` sentinel.
    finish_reason: Option<FinishReason>,
    finished: bool,
}

impl ChunkParser {
    fn new() -> Self {
        Self {
            finish_reason: None,
            finished: false,
        }
    }

    /// Parse one SSE frame, yielding zero or more events.
    fn parse_frame(&mut self, frame: &str) -> Vec<ModelResult<TokenEvent>> {
        let mut events = Vec::new();

        for line in frame.lines() {
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data.is_empty() {
                continue;
            }

            if data == "[DONE]" {
                self.finished = true;
                events.push(Ok(TokenEvent::Done(
                    self.finish_reason.unwrap_or(FinishReason::Stop),
                )));
                break;
            }

            let chunk: StreamChunk = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Failed to parse model stream chunk");
                    events.push(Err(ModelStreamError::Protocol {
                        reason: format!("unparseable chunk: {}", e),
                    }));
                    break;
                }
            };

            for choice in chunk.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        events.push(Ok(TokenEvent::Delta(content)));
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    self.finish_reason = Some(map_finish_reason(&reason));
                }
            }
        }

        events
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "stop" => FinishReason::Stop,
        other => {
            debug!(finish_reason = other, "Unrecognized upstream finish reason");
            FinishReason::Stop
        }
    }
}
