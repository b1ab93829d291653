// Mock retrieval and model backends for integration tests
#![allow(dead_code)]

use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use axum::{
    body::Body,
    extract::{Json, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

/// A running mock server; the task is aborted on drop.
pub struct MockServer {
    pub url: String,
    handle: JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(app: Router) -> MockServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockServer {
        url: format!("http://{}", addr),
        handle,
    }
}

// ============================================================================
// Mock retrieval backend
// ============================================================================

#[derive(Clone)]
pub enum RetrievalBehavior {
    /// Return these (source_id, text, score) passages.
    Passages(Vec<(&'static str, &'static str, f32)>),
    /// Fail every search with this status.
    Status(u16),
}

#[derive(Clone)]
struct RetrievalState {
    behavior: RetrievalBehavior,
    calls: Arc<AtomicUsize>,
}

pub struct MockRetrievalServer {
    pub server: MockServer,
    calls: Arc<AtomicUsize>,
}

impl MockRetrievalServer {
    pub async fn start(behavior: RetrievalBehavior) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = RetrievalState {
            behavior,
            calls: calls.clone(),
        };
        let app = Router::new()
            .route("/search", post(search_handler))
            .with_state(state);
        Self {
            server: serve(app).await,
            calls,
        }
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn search_handler(
    State(state): State<RetrievalState>,
    Json(_request): Json<Value>,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    match &state.behavior {
        RetrievalBehavior::Passages(passages) => {
            let passages: Vec<Value> = passages
                .iter()
                .map(|(source_id, text, score)| {
                    json!({"sourceId": source_id, "text": text, "score": score})
                })
                .collect();
            Json(json!({ "passages": passages })).into_response()
        }
        RetrievalBehavior::Status(status) => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "retrieval unavailable",
        )
            .into_response(),
    }
}

// ============================================================================
// Mock model backend
// ============================================================================

#[derive(Clone)]
pub enum ModelBehavior {
    /// Stream these deltas, a finish chunk, and the `[DONE]` sentinel.
    Script {
        deltas: Vec<&'static str>,
        finish_reason: &'static str,
    },
    /// Stream these deltas then close the connection without a terminator.
    TruncateAfter { deltas: Vec<&'static str> },
    /// Stream these deltas then stall until the client goes away.
    StallAfter { deltas: Vec<&'static str> },
    /// Reject every request with this status.
    Status(u16),
}

#[derive(Clone)]
struct ModelState {
    behavior: ModelBehavior,
    calls: Arc<AtomicUsize>,
    last_prompt: Arc<Mutex<Option<String>>>,
}

pub struct MockModelServer {
    pub server: MockServer,
    calls: Arc<AtomicUsize>,
    last_prompt: Arc<Mutex<Option<String>>>,
}

impl MockModelServer {
    pub async fn start(behavior: ModelBehavior) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_prompt = Arc::new(Mutex::new(None));
        let state = ModelState {
            behavior,
            calls: calls.clone(),
            last_prompt: last_prompt.clone(),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(completions_handler))
            .with_state(state);
        Self {
            server: serve(app).await,
            calls,
            last_prompt,
        }
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt text of the most recent completion request.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

fn delta_frame(content: &str) -> Bytes {
    let chunk = json!({
        "choices": [{"delta": {"content": content}, "finish_reason": null}]
    });
    Bytes::from(format!("data: {}\n\n", chunk))
}

fn finish_frame(finish_reason: &str) -> Bytes {
    let chunk = json!({
        "choices": [{"delta": {}, "finish_reason": finish_reason}]
    });
    Bytes::from(format!("data: {}\n\n", chunk))
}

fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

async fn completions_handler(
    State(state): State<ModelState>,
    Json(request): Json<Value>,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);

    let prompt = request
        .get("messages")
        .and_then(|m| m.get(0))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(String::from);
    *state.last_prompt.lock().unwrap() = prompt;

    let frames: Vec<Result<Bytes, Infallible>> = match &state.behavior {
        ModelBehavior::Script {
            deltas,
            finish_reason,
        } => {
            let mut frames: Vec<_> = deltas.iter().map(|d| Ok(delta_frame(d))).collect();
            frames.push(Ok(finish_frame(finish_reason)));
            frames.push(Ok(done_frame()));
            frames
        }
        ModelBehavior::TruncateAfter { deltas } => {
            deltas.iter().map(|d| Ok(delta_frame(d))).collect()
        }
        ModelBehavior::StallAfter { deltas } => {
            let frames: Vec<_> = deltas.iter().map(|d| Ok(delta_frame(d))).collect();
            let body = Body::from_stream(
                stream::iter(frames).chain(stream::pending::<Result<Bytes, Infallible>>()),
            );
            return sse_response(body);
        }
        ModelBehavior::Status(status) => {
            return (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "model backend unavailable",
            )
                .into_response();
        }
    };

    sse_response(Body::from_stream(stream::iter(frames)))
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response
}
