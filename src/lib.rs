//! raggate — streaming retrieval-augmented chat completions gateway.
//!
//! One data-plane route, `POST /v1/chat/completions/stream`: retrieve
//! passages from a vector store, assemble a token-budgeted prompt, stream a
//! completion from an OpenAI-compatible model backend, and relay deltas to
//! the caller as Server-Sent Events. The pipeline degrades gracefully when
//! retrieval is down, always terminates the stream with exactly one `done`
//! event, and cancels cooperatively on client disconnect, timeout, or
//! shutdown.

pub mod app_context;
pub mod config;
pub mod middleware;
pub mod model;
pub mod observability;
pub mod prompt;
pub mod retrieval;
pub mod routers;
pub mod server;
pub mod streaming;

pub use app_context::AppContext;
pub use config::GatewayConfig;
