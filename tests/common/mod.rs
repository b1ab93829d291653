// Shared helpers for integration tests - used across test files
#![allow(dead_code)]

pub mod mock_backends;

use axum::body::Body;
use http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;

/// Build a POST request to the streaming chat route.
pub fn chat_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions/stream")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Collect a whole response body as UTF-8 text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Collect a streamed SSE body and parse each `data:` frame as JSON.
pub async fn collect_sse_events(response: Response<Body>) -> Vec<Value> {
    let text = body_text(response).await;
    parse_sse_events(&text)
}

/// Parse `data: {json}\n\n` frames out of an SSE body.
pub fn parse_sse_events(text: &str) -> Vec<Value> {
    text.split("\n\n")
        .filter_map(|frame| frame.trim().strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

/// Concatenate the `delta` fields of parsed SSE events, in order.
pub fn concat_deltas(events: &[Value]) -> String {
    events
        .iter()
        .filter_map(|e| e.get("delta").and_then(Value::as_str))
        .collect()
}
