//! Wire-level protocol types for the raggate chat API.
//!
//! Everything the HTTP surface serializes or deserializes lives here:
//! the chat request shape, the streamed event frames, and the structured
//! error body. The gateway itself depends on this crate; clients can too.

pub mod chat;
pub mod error;
pub mod stream;
pub mod validated;

pub use chat::{ChatMessage, ChatOptions, ChatRequest, Role};
pub use error::{ErrorBody, ErrorDetail, KIND_VALIDATION};
pub use stream::{DoneEvent, FinishReason, StreamEvent};
pub use validated::Normalizable;
#[cfg(feature = "axum")]
pub use validated::ValidatedJson;
