use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::header::AUTHORIZATION;

use crate::routers::error;

/// Static bearer-key configuration for the data-plane routes.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

pub async fn auth_middleware(
    State(config): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &config.api_key else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false);

    if authorized {
        next.run(request).await
    } else {
        error::unauthorized("AuthenticationError", "Invalid or missing API key")
    }
}
