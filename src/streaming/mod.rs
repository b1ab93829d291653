//! The streaming core: per-request session state, the SSE sink, and the
//! multiplexer that drives retrieval → prompt → model stream → wire.

mod multiplexer;
mod session;
mod sink;

pub use multiplexer::StreamMultiplexer;
pub use session::{SessionState, StreamSession};
pub use sink::{format_sse_event, SinkClosed, SseSink, SSE_CHANNEL_SIZE};
