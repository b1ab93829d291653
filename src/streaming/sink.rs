//! SSE sink for one response stream.

use std::io;

use bytes::Bytes;
use rag_protocol::StreamEvent;
use tokio::sync::mpsc;

use super::session::StreamSession;

/// Channel buffer size for SSE events sent to the client. Deliberately
/// small: the multiplexer pulls one token per write, so this bounds how far
/// the model stream can run ahead of the client.
pub const SSE_CHANNEL_SIZE: usize = 32;

/// The response channel closed — the client went away.
#[derive(Debug, thiserror::Error)]
#[error("response channel closed by client disconnect")]
pub struct SinkClosed;

/// Writer for one request's SSE response body.
///
/// Exclusively owned by the request that created it; all writes are ordered
/// through the single underlying channel.
pub struct SseSink {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl SseSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes, io::Error>>) -> Self {
        Self { tx }
    }

    /// Encode and write one wire event, waiting for channel capacity.
    pub async fn send(
        &self,
        session: &mut StreamSession,
        event: &StreamEvent,
    ) -> Result<(), SinkClosed> {
        let bytes = format_sse_event(event);
        let len = bytes.len();
        self.tx.send(Ok(bytes)).await.map_err(|_| SinkClosed)?;
        session.add_bytes(len);
        Ok(())
    }
}

/// Format a wire event as an SSE frame: `data: <json>\n\n`
pub fn format_sse_event(event: &StreamEvent) -> Bytes {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {}\n\n", json))
}
