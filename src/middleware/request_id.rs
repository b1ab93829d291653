use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::{HeaderName, HeaderValue};
use rand::Rng;

static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request id propagated through extensions and echoed on the response.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[derive(Clone)]
pub struct RequestIdConfig {
    /// Inbound headers checked, in order, for a caller-supplied id.
    pub headers: Vec<String>,
}

pub fn default_request_id_headers() -> Vec<String> {
    vec![
        "x-request-id".to_string(),
        "x-correlation-id".to_string(),
        "x-trace-id".to_string(),
        "request-id".to_string(),
    ]
}

/// Generate a request ID based on endpoint
fn generate_request_id(path: &str) -> String {
    let prefix = if path.contains("/chat/completions") {
        "chatcmpl-"
    } else {
        "req-"
    };

    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    let random_part: String = (0..24)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect();

    format!("{}{}", prefix, random_part)
}

pub async fn request_id_middleware(
    State(config): State<RequestIdConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut request_id = None;

    for header_name in &config.headers {
        if let Some(value) = request.headers().get(header_name) {
            if let Ok(value) = value.to_str() {
                request_id = Some(value.to_string());
                break;
            }
        }
    }

    let request_id = request_id.unwrap_or_else(|| generate_request_id(request.uri().path()));
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}
