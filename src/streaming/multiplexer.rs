//! Pipeline driver for one streaming request.
//!
//! Coordinates retrieval → prompt assembly → model streaming → wire
//! encoding. Retrieval failure degrades to a zero-passage prompt; every
//! other failure finalizes the stream with a terminal `done` event. The
//! cancellation token is checked before retrieval, before prompt assembly,
//! and at every token pull, and in-flight upstream work is aborted rather
//! than awaited once cancellation is observed.

use std::sync::Arc;

use rag_protocol::{ChatRequest, FinishReason, StreamEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::session::{SessionState, StreamSession};
use super::sink::SseSink;
use crate::model::{ModelStreamClient, TokenEvent};
use crate::prompt::PromptAssembler;
use crate::retrieval::RetrievalClient;

pub struct StreamMultiplexer {
    retrieval: Arc<dyn RetrievalClient>,
    model: Arc<dyn ModelStreamClient>,
    assembler: PromptAssembler,
    top_k: usize,
}

impl StreamMultiplexer {
    pub fn new(
        retrieval: Arc<dyn RetrievalClient>,
        model: Arc<dyn ModelStreamClient>,
        assembler: PromptAssembler,
        top_k: usize,
    ) -> Self {
        Self {
            retrieval,
            model,
            assembler,
            top_k,
        }
    }

    /// Drive the session to `Closed`.
    ///
    /// Never returns without finalizing: on every path the wire has seen
    /// exactly one terminal `done` event (or the client is already gone and
    /// the terminal write was a no-op against a closed channel).
    pub async fn run(
        &self,
        request: &ChatRequest,
        session: &mut StreamSession,
        sink: &SseSink,
        cancel: &CancellationToken,
    ) {
        // Validated requests always carry a trailing user message.
        let query = request.latest_user_message().unwrap_or_default();

        session.advance(SessionState::Retrieving);
        if cancel.is_cancelled() {
            return self.finalize_cancelled(session, sink).await;
        }

        let passages = tokio::select! {
            _ = cancel.cancelled() => {
                return self.finalize_cancelled(session, sink).await;
            }
            result = self.retrieval.search(query, self.top_k) => match result {
                Ok(passages) => passages,
                Err(e) => {
                    // Degraded-but-available: a chat answer without
                    // retrieved context beats no answer.
                    warn!(
                        error = %e,
                        transient = e.is_transient(),
                        "Retrieval failed; continuing with zero passages"
                    );
                    Vec::new()
                }
            },
        };

        session.advance(SessionState::Prompting);
        if cancel.is_cancelled() {
            return self.finalize_cancelled(session, sink).await;
        }

        let prompt = match self.assembler.build(&passages, request.history(), query) {
            Ok(prompt) => prompt,
            Err(e) => {
                error!(error = %e, "Prompt assembly failed");
                return self.finalize(session, sink, FinishReason::Error).await;
            }
        };

        session.advance(SessionState::Streaming);

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => {
                return self.finalize_cancelled(session, sink).await;
            }
            result = self.model.stream(&prompt, &request.options) => match result {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "Failed to open model stream");
                    return self.finalize(session, sink, FinishReason::Error).await;
                }
            },
        };

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    stream.abort();
                    return self.finalize_cancelled(session, sink).await;
                }
                event = stream.next_event() => event,
            };

            match event {
                Some(Ok(TokenEvent::Delta(text))) => {
                    if sink
                        .send(session, &StreamEvent::delta(text))
                        .await
                        .is_err()
                    {
                        debug!("Client disconnected mid-stream");
                        stream.abort();
                        session.mark_cancelled();
                        return self.finalize(session, sink, FinishReason::Cancelled).await;
                    }
                }
                Some(Ok(TokenEvent::Done(reason))) => {
                    return self.finalize(session, sink, reason).await;
                }
                Some(Err(e)) => {
                    // Flushed deltas cannot be retracted; the terminal
                    // event carries the failure in-band.
                    error!(error = %e, "Model stream failed mid-response");
                    return self.finalize(session, sink, FinishReason::Error).await;
                }
                None => {
                    warn!("Model stream ended without terminal event");
                    return self.finalize(session, sink, FinishReason::Error).await;
                }
            }
        }
    }

    async fn finalize_cancelled(&self, session: &mut StreamSession, sink: &SseSink) {
        session.mark_cancelled();
        self.finalize(session, sink, FinishReason::Cancelled).await
    }

    async fn finalize(&self, session: &mut StreamSession, sink: &SseSink, reason: FinishReason) {
        session.advance(SessionState::Finalizing);
        if sink
            .send(session, &StreamEvent::done(reason))
            .await
            .is_err()
        {
            debug!("Terminal event dropped; client already disconnected");
        }
        session.advance(SessionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use rag_protocol::{ChatMessage, ChatOptions};
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::PromptConfig;
    use crate::model::{ModelResult, ModelStreamError, TokenStream};
    use crate::prompt::AssembledPrompt;
    use crate::retrieval::{RetrievalError, RetrievalResult, RetrievedPassage};
    use crate::streaming::sink::SSE_CHANNEL_SIZE;

    struct MockRetrieval {
        passages: Vec<RetrievedPassage>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl MockRetrieval {
        fn returning(passages: Vec<RetrievedPassage>) -> Self {
            Self {
                passages,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                passages: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RetrievalClient for MockRetrieval {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
        ) -> RetrievalResult<Vec<RetrievedPassage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RetrievalError::Timeout { timeout_secs: 3 })
            } else {
                Ok(self.passages.clone())
            }
        }
    }

    /// Scripted model: emits the given events, then optionally stalls
    /// until aborted.
    struct MockModel {
        script: Vec<ModelResult<TokenEvent>>,
        stall_after_script: bool,
        calls: AtomicUsize,
        seen_prompt: Mutex<Option<String>>,
    }

    impl MockModel {
        fn scripted(script: Vec<ModelResult<TokenEvent>>) -> Self {
            Self {
                script,
                stall_after_script: false,
                calls: AtomicUsize::new(0),
                seen_prompt: Mutex::new(None),
            }
        }

        fn stalling(script: Vec<ModelResult<TokenEvent>>) -> Self {
            Self {
                script,
                stall_after_script: true,
                calls: AtomicUsize::new(0),
                seen_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ModelStreamClient for MockModel {
        async fn stream(
            &self,
            prompt: &AssembledPrompt,
            _options: &ChatOptions,
        ) -> ModelResult<TokenStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_prompt.lock().unwrap() = Some(prompt.text.clone());

            let script: Vec<ModelResult<TokenEvent>> = self
                .script
                .iter()
                .map(|e| match e {
                    Ok(event) => Ok(event.clone()),
                    Err(err) => Err(ModelStreamError::Transport {
                        reason: err.to_string(),
                    }),
                })
                .collect();
            let stall = self.stall_after_script;

            let (tx, rx) = mpsc::channel(4);
            let relay = tokio::spawn(async move {
                for event in script {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                if stall {
                    tx.closed().await;
                }
            });

            Ok(TokenStream::new(rx, relay))
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            conversation_id: None,
            messages: vec![ChatMessage::user("What is the capital of France?")],
            options: ChatOptions {
                max_tokens: 50,
                temperature: 1.0,
            },
        }
    }

    fn assembler() -> PromptAssembler {
        PromptAssembler::new(&PromptConfig {
            context_window_tokens: 2048,
            completion_reserve_tokens: 256,
            system_preamble: None,
        })
    }

    fn passage(text: &str) -> RetrievedPassage {
        RetrievedPassage {
            source_id: "doc-1".to_string(),
            text: text.to_string(),
            score: 0.9,
        }
    }

    async fn collect_events(
        mut rx: mpsc::Receiver<Result<Bytes, io::Error>>,
    ) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(frame) = rx.recv().await {
            let text = String::from_utf8(frame.unwrap().to_vec()).unwrap();
            let data = text
                .strip_prefix("data: ")
                .and_then(|s| s.strip_suffix("\n\n"))
                .unwrap();
            events.push(serde_json::from_str(data).unwrap());
        }
        events
    }

    fn multiplexer(retrieval: MockRetrieval, model: MockModel) -> StreamMultiplexer {
        StreamMultiplexer::new(Arc::new(retrieval), Arc::new(model), assembler(), 5)
    }

    #[tokio::test]
    async fn test_happy_path_three_chunks() {
        let mux = multiplexer(
            MockRetrieval::returning(vec![passage("Paris is the capital of France.")]),
            MockModel::scripted(vec![
                Ok(TokenEvent::Delta("Paris".to_string())),
                Ok(TokenEvent::Delta(" is the capital.".to_string())),
                Ok(TokenEvent::Done(FinishReason::Stop)),
            ]),
        );

        let (tx, rx) = mpsc::channel(SSE_CHANNEL_SIZE);
        let mut session = StreamSession::new();
        mux.run(
            &request(),
            &mut session,
            &SseSink::new(tx),
            &CancellationToken::new(),
        )
        .await;

        let events = collect_events(rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("Paris"),
                StreamEvent::delta(" is the capital."),
                StreamEvent::done(FinishReason::Stop),
            ]
        );
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_cancelled());
        assert!(session.bytes_written() > 0);
    }

    #[tokio::test]
    async fn test_deltas_reconstruct_model_output() {
        let chunks = ["The", " quick", " brown", " fox"];
        let mut script: Vec<ModelResult<TokenEvent>> = chunks
            .iter()
            .map(|c| Ok(TokenEvent::Delta(c.to_string())))
            .collect();
        script.push(Ok(TokenEvent::Done(FinishReason::Length)));

        let mux = multiplexer(
            MockRetrieval::returning(vec![]),
            MockModel::scripted(script),
        );

        let (tx, rx) = mpsc::channel(SSE_CHANNEL_SIZE);
        let mut session = StreamSession::new();
        mux.run(
            &request(),
            &mut session,
            &SseSink::new(tx),
            &CancellationToken::new(),
        )
        .await;

        let events = collect_events(rx).await;
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Delta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, chunks.concat());
        assert_eq!(
            *events.last().unwrap(),
            StreamEvent::done(FinishReason::Length)
        );
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_zero_passages() {
        let model = MockModel::scripted(vec![
            Ok(TokenEvent::Delta("Paris.".to_string())),
            Ok(TokenEvent::Done(FinishReason::Stop)),
        ]);
        let mux = StreamMultiplexer::new(
            Arc::new(MockRetrieval::failing()),
            Arc::new(model),
            assembler(),
            5,
        );

        let (tx, rx) = mpsc::channel(SSE_CHANNEL_SIZE);
        let mut session = StreamSession::new();
        mux.run(
            &request(),
            &mut session,
            &SseSink::new(tx),
            &CancellationToken::new(),
        )
        .await;

        let events = collect_events(rx).await;
        // Degradation: the request still completes with a non-error reason.
        assert_eq!(
            *events.last().unwrap(),
            StreamEvent::done(FinishReason::Stop)
        );
    }

    #[tokio::test]
    async fn test_degraded_prompt_contains_no_passages() {
        let model = Arc::new(MockModel::scripted(vec![Ok(TokenEvent::Done(
            FinishReason::Stop,
        ))]));
        let mux = StreamMultiplexer::new(
            Arc::new(MockRetrieval::failing()),
            model.clone(),
            assembler(),
            5,
        );

        let (tx, rx) = mpsc::channel(SSE_CHANNEL_SIZE);
        let mut session = StreamSession::new();
        mux.run(
            &request(),
            &mut session,
            &SseSink::new(tx),
            &CancellationToken::new(),
        )
        .await;
        collect_events(rx).await;

        let prompt = model.seen_prompt.lock().unwrap().clone().unwrap();
        assert!(!prompt.contains("Context passages"));
    }

    #[tokio::test]
    async fn test_model_error_after_two_deltas() {
        let mux = multiplexer(
            MockRetrieval::returning(vec![]),
            MockModel::scripted(vec![
                Ok(TokenEvent::Delta("one".to_string())),
                Ok(TokenEvent::Delta("two".to_string())),
                Err(ModelStreamError::Transport {
                    reason: "connection reset".to_string(),
                }),
            ]),
        );

        let (tx, rx) = mpsc::channel(SSE_CHANNEL_SIZE);
        let mut session = StreamSession::new();
        mux.run(
            &request(),
            &mut session,
            &SseSink::new(tx),
            &CancellationToken::new(),
        )
        .await;

        let events = collect_events(rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("one"),
                StreamEvent::delta("two"),
                StreamEvent::done(FinishReason::Error),
            ]
        );
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_prompt_too_large_is_fatal() {
        let retrieval = MockRetrieval::returning(vec![]);
        let model = Arc::new(MockModel::scripted(vec![Ok(TokenEvent::Done(
            FinishReason::Stop,
        ))]));
        let tight = PromptAssembler::new(&PromptConfig {
            context_window_tokens: 4,
            completion_reserve_tokens: 0,
            system_preamble: None,
        });
        let mux = StreamMultiplexer::new(Arc::new(retrieval), model.clone(), tight, 5);

        let mut big_request = request();
        big_request.messages = vec![ChatMessage::user("word ".repeat(100))];

        let (tx, rx) = mpsc::channel(SSE_CHANNEL_SIZE);
        let mut session = StreamSession::new();
        mux.run(
            &big_request,
            &mut session,
            &SseSink::new(tx),
            &CancellationToken::new(),
        )
        .await;

        let events = collect_events(rx).await;
        assert_eq!(events, vec![StreamEvent::done(FinishReason::Error)]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_retrieval_skips_downstream() {
        let retrieval = Arc::new(MockRetrieval::returning(vec![]));
        let model = Arc::new(MockModel::scripted(vec![]));
        let mux = StreamMultiplexer::new(retrieval.clone(), model.clone(), assembler(), 5);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, rx) = mpsc::channel(SSE_CHANNEL_SIZE);
        let mut session = StreamSession::new();
        mux.run(&request(), &mut session, &SseSink::new(tx), &cancel)
            .await;

        let events = collect_events(rx).await;
        assert_eq!(events, vec![StreamEvent::done(FinishReason::Cancelled)]);
        assert_eq!(retrieval.calls.load(Ordering::SeqCst), 0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(session.is_cancelled());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_stops_writes() {
        let mux = multiplexer(
            MockRetrieval::returning(vec![]),
            MockModel::stalling(vec![Ok(TokenEvent::Delta("partial".to_string()))]),
        );

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(SSE_CHANNEL_SIZE);

        let cancel_clone = cancel.clone();
        let driver = tokio::spawn(async move {
            let mut session = StreamSession::new();
            mux.run(&request(), &mut session, &SseSink::new(tx), &cancel_clone)
                .await;
            session
        });

        // First delta arrives, then the model stalls.
        let first = rx.recv().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("partial"));

        cancel.cancel();
        let session = driver.await.unwrap();

        let events = collect_events(rx).await;
        assert_eq!(events, vec![StreamEvent::done(FinishReason::Cancelled)]);
        assert!(session.is_cancelled());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_client_disconnect_finalizes_without_panic() {
        let mux = multiplexer(
            MockRetrieval::returning(vec![]),
            MockModel::scripted(vec![
                Ok(TokenEvent::Delta("a".to_string())),
                Ok(TokenEvent::Delta("b".to_string())),
                Ok(TokenEvent::Done(FinishReason::Stop)),
            ]),
        );

        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let mut session = StreamSession::new();
        mux.run(
            &request(),
            &mut session,
            &SseSink::new(tx),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.is_cancelled());
        assert_eq!(session.bytes_written(), 0);
    }
}
