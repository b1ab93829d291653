use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validated::Normalizable;

// ============================================================================
// Chat Messages
// ============================================================================

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// Chat Request
// ============================================================================

/// A request to `/v1/chat/completions/stream`.
///
/// Immutable once accepted; one instance lives for the duration of a single
/// streaming request.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Opaque conversation identifier supplied by the caller.
    pub conversation_id: Option<String>,

    /// Ordered conversation so far. Must be non-empty and end with a
    /// `user` message.
    #[validate(custom(function = "validate_messages"))]
    pub messages: Vec<ChatMessage>,

    /// Generation options.
    #[validate(nested)]
    pub options: ChatOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    /// Upper bound on generated completion tokens.
    #[validate(range(min = 1))]
    pub max_tokens: u32,

    /// Sampling temperature, between 0 and 2.
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    1.0
}

impl ChatRequest {
    /// The trailing user message content — the retrieval query.
    ///
    /// Guaranteed present on a validated request.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// All messages preceding the trailing user message.
    pub fn history(&self) -> &[ChatMessage] {
        match self.messages.split_last() {
            Some((last, rest)) if last.role == Role::User => rest,
            _ => &self.messages,
        }
    }
}

impl Normalizable for ChatRequest {}

/// Validates the messages array is non-empty and ends with a user turn.
fn validate_messages(messages: &[ChatMessage]) -> Result<(), validator::ValidationError> {
    if messages.is_empty() {
        return Err(validator::ValidationError::new("messages cannot be empty"));
    }

    match messages.last() {
        Some(m) if m.role == Role::User => {}
        _ => {
            return Err(validator::ValidationError::new(
                "messages must end with a user message",
            ));
        }
    }

    for msg in messages {
        if msg.content.is_empty() {
            return Err(validator::ValidationError::new(
                "message content cannot be empty",
            ));
        }
    }

    Ok(())
}
