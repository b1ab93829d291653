use serde::{Deserialize, Serialize};

// ============================================================================
// Structured error body
// ============================================================================

/// Body of every non-streaming (pre-stream) error response:
/// `{"error": {"kind": "...", "message": "..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                kind: kind.into(),
                message: message.into(),
            },
        }
    }
}

/// Error kind emitted when request validation fails before the stream opens.
pub const KIND_VALIDATION: &str = "ValidationError";
