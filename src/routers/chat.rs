//! The `/v1/chat/completions/stream` entry point.
//!
//! Validation happens before any downstream call; once the request is
//! accepted the handler opens the SSE response and hands the pipeline to a
//! spawned `StreamMultiplexer` task. The response channel is the ownership
//! boundary: dropping the body (client disconnect) cancels the pipeline via
//! a drop guard, and the sender dropping at task exit closes the response
//! exactly once.

use std::{io, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::StreamExt;
use rag_protocol::{ChatRequest, ValidatedJson, KIND_VALIDATION};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::error;
use crate::server::AppState;
use crate::streaming::{SseSink, StreamSession, SSE_CHANNEL_SIZE};

pub async fn chat_completions_stream(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ChatRequest>,
) -> Response {
    let context = &state.context;

    let limit = context.config.max_tokens_limit;
    if request.options.max_tokens > limit {
        return error::bad_request(
            KIND_VALIDATION,
            format!("maxTokens {} exceeds server limit {}", request.options.max_tokens, limit),
        );
    }

    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(SSE_CHANNEL_SIZE);
    let cancel = CancellationToken::new();

    // Per-request timeout covering the whole pipeline. The watchdog exits
    // as soon as the session ends, whichever comes first.
    let timeout = Duration::from_secs(context.config.request_timeout_secs);
    let watchdog = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                debug!("Request timeout reached; cancelling pipeline");
                watchdog.cancel();
            }
            _ = watchdog.cancelled() => {}
        }
    });

    let multiplexer = context.multiplexer.clone();
    let run_cancel = cancel.clone();
    let stream_id = format!("stream_{}", Uuid::new_v4());
    tokio::spawn(async move {
        let mut session = StreamSession::new();
        let sink = SseSink::new(tx);
        multiplexer
            .run(&request, &mut session, &sink, &run_cancel)
            .await;
        debug!(
            stream_id = %stream_id,
            conversation_id = ?request.conversation_id,
            bytes_written = session.bytes_written(),
            cancelled = session.is_cancelled(),
            "Stream session closed"
        );
        // Releases the watchdog; the sink closed when `tx` dropped above.
        run_cancel.cancel();
    });

    // Client disconnect drops the body stream, which cancels the pipeline.
    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |item| {
        let _ = &guard;
        item
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}
