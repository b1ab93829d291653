//! Streaming completion client against the model backend.

mod openai;

pub use openai::OpenAiStreamClient;

use async_trait::async_trait;
use rag_protocol::{ChatOptions, FinishReason};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::prompt::AssembledPrompt;

/// One event from the model's token stream, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    /// A piece of completion text. Clients reconstruct the full text by
    /// concatenating deltas in arrival order.
    Delta(String),
    /// Terminal event; no further events follow.
    Done(FinishReason),
}

/// Model stream errors
#[derive(Debug, thiserror::Error)]
pub enum ModelStreamError {
    #[error("Failed to reach model backend: {reason}")]
    Connect { reason: String },

    #[error("Model backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model stream transport error: {reason}")]
    Transport { reason: String },

    #[error("Malformed model stream: {reason}")]
    Protocol { reason: String },
}

/// Result type for model stream operations
pub type ModelResult<T> = Result<T, ModelStreamError>;

/// A finite, non-restartable sequence of token events.
///
/// Events arrive through a bounded channel, so the consumer pulling one
/// event at a time is what paces the upstream read — backpressure falls out
/// of the channel capacity. Dropping the stream (or calling [`abort`]) stops
/// the relay task and releases the upstream connection promptly.
///
/// [`abort`]: TokenStream::abort
pub struct TokenStream {
    rx: mpsc::Receiver<ModelResult<TokenEvent>>,
    relay: JoinHandle<()>,
}

impl TokenStream {
    pub fn new(rx: mpsc::Receiver<ModelResult<TokenEvent>>, relay: JoinHandle<()>) -> Self {
        Self { rx, relay }
    }

    /// Next event in arrival order; `None` once the sequence is exhausted.
    pub async fn next_event(&mut self) -> Option<ModelResult<TokenEvent>> {
        self.rx.recv().await
    }

    /// Abort the underlying request without consuming the remainder.
    pub fn abort(self) {
        self.relay.abort();
    }
}

impl Drop for TokenStream {
    fn drop(&mut self) {
        // The relay task also exits on its own once the receiver is gone;
        // aborting just skips waiting for the next upstream chunk.
        self.relay.abort();
    }
}

/// Client that opens streaming completion requests.
///
/// Connections are pooled and shared across requests; each call returns a
/// fresh single-use stream.
#[async_trait]
pub trait ModelStreamClient: Send + Sync {
    async fn stream(
        &self,
        prompt: &AssembledPrompt,
        options: &ChatOptions,
    ) -> ModelResult<TokenStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_stream_yields_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let relay = tokio::spawn(async move {
            for event in [
                TokenEvent::Delta("Paris".to_string()),
                TokenEvent::Delta(" is the capital.".to_string()),
                TokenEvent::Done(FinishReason::Stop),
            ] {
                let _ = tx.send(Ok(event)).await;
            }
        });

        let mut stream = TokenStream::new(rx, relay);
        assert_eq!(
            stream.next_event().await.unwrap().unwrap(),
            TokenEvent::Delta("Paris".to_string())
        );
        assert_eq!(
            stream.next_event().await.unwrap().unwrap(),
            TokenEvent::Delta(" is the capital.".to_string())
        );
        assert_eq!(
            stream.next_event().await.unwrap().unwrap(),
            TokenEvent::Done(FinishReason::Stop)
        );
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_abort_stops_relay() {
        let (tx, rx) = mpsc::channel(1);
        let relay = tokio::spawn(async move {
            loop {
                if tx
                    .send(Ok(TokenEvent::Delta("x".to_string())))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let stream = TokenStream::new(rx, relay);
        stream.abort();
    }

    #[test]
    fn test_error_display() {
        let error = ModelStreamError::Status {
            status: 500,
            body: "backend exploded".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Model backend returned status 500: backend exploded"
        );
    }
}
