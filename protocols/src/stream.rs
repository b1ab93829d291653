use serde::{Deserialize, Serialize};

// ============================================================================
// Streamed wire events
// ============================================================================

/// Why a completion stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Cancelled,
    Error,
}

/// One frame on the wire. Each SSE `data:` line carries exactly one of
/// these, and every stream ends with exactly one `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Delta { delta: String },
    Done { done: DoneEvent },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneEvent {
    #[serde(rename = "finishReason")]
    pub finish_reason: FinishReason,
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamEvent::Delta { delta: text.into() }
    }

    pub fn done(finish_reason: FinishReason) -> Self {
        StreamEvent::Done {
            done: DoneEvent { finish_reason },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }
}
