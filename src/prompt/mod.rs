//! Prompt assembly under a token budget.
//!
//! Pure: no I/O, no side effects. The assembler merges retrieved passages,
//! conversation history, and the new user query into a single model-ready
//! prompt, dropping lowest-score passages when the budget would otherwise
//! be exceeded.

use std::fmt::Write as _;

use once_cell::sync::Lazy;
use rag_protocol::ChatMessage;
use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::config::PromptConfig;
use crate::retrieval::RetrievedPassage;

static BPE: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::p50k_base().expect("embedded p50k token tables"));

/// A prompt ready to hand to the model backend.
///
/// Invariant: `token_count` never exceeds the configured prompt budget.
/// Consumed exactly once by a model stream call.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub text: String,
    pub token_count: usize,
}

/// Prompt assembly errors
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt needs {token_count} tokens with zero passages, budget is {budget}")]
    TooLarge { token_count: usize, budget: usize },
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    budget: usize,
    system_preamble: Option<String>,
}

impl PromptAssembler {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            budget: config.prompt_budget(),
            system_preamble: config.system_preamble.clone(),
        }
    }

    /// Merge passages, history, and the new query into one prompt.
    ///
    /// Passages are dropped lowest score first until the prompt fits the
    /// budget; among equal scores the most-recently-retrieved passage is
    /// dropped last. Fails only when the zero-passage prompt is already
    /// over budget.
    pub fn build(
        &self,
        passages: &[RetrievedPassage],
        history: &[ChatMessage],
        query: &str,
    ) -> Result<AssembledPrompt, PromptError> {
        let base_text = self.render(&[], history, query);
        let base_tokens = count_tokens(&base_text);
        if base_tokens > self.budget {
            return Err(PromptError::TooLarge {
                token_count: base_tokens,
                budget: self.budget,
            });
        }

        // Drop order: ascending score, then ascending insertion index.
        let mut drop_order: Vec<usize> = (0..passages.len()).collect();
        drop_order.sort_by(|&a, &b| {
            passages[a]
                .score
                .partial_cmp(&passages[b].score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut kept: Vec<bool> = vec![true; passages.len()];
        let mut dropped = 0usize;
        loop {
            let selected: Vec<&RetrievedPassage> = passages
                .iter()
                .zip(&kept)
                .filter_map(|(p, &keep)| keep.then_some(p))
                .collect();
            let text = self.render(&selected, history, query);
            let token_count = count_tokens(&text);

            if token_count <= self.budget {
                if dropped > 0 {
                    debug!(
                        dropped,
                        kept = selected.len(),
                        token_count,
                        "Dropped passages to fit prompt budget"
                    );
                }
                return Ok(AssembledPrompt { text, token_count });
            }

            match drop_order.get(dropped) {
                Some(&index) => {
                    kept[index] = false;
                    dropped += 1;
                }
                // Unreachable: the zero-passage prompt fits the budget.
                None => {
                    return Ok(AssembledPrompt {
                        text: base_text,
                        token_count: base_tokens,
                    })
                }
            }
        }
    }

    fn render(
        &self,
        passages: &[&RetrievedPassage],
        history: &[ChatMessage],
        query: &str,
    ) -> String {
        let mut text = String::new();

        if let Some(preamble) = &self.system_preamble {
            text.push_str(preamble);
            text.push_str("\n\n");
        }

        if !passages.is_empty() {
            text.push_str("Context passages:\n");
            for (i, passage) in passages.iter().enumerate() {
                let _ = writeln!(text, "[{}] ({}) {}", i + 1, passage.source_id, passage.text);
            }
            text.push('\n');
        }

        if !history.is_empty() {
            text.push_str("Conversation:\n");
            for message in history {
                let _ = writeln!(text, "{}: {}", message.role, message.content);
            }
            text.push('\n');
        }

        let _ = write!(text, "user: {}\nassistant:", query);
        text
    }
}

fn count_tokens(text: &str) -> usize {
    BPE.encode_with_special_tokens(text).len()
}
