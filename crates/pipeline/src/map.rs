//! Map stage: one completion call per chunk.

use std::sync::Arc;

use distill_ingest::chunker::Chunk;
use distill_llm::{LlmError, LlmProvider};

use crate::calls::{complete_with_retry, CallOptions};
use crate::prompt::PromptTemplate;

/// The map stage's output for one chunk. Exists only between the map and
/// reduce stages.
#[derive(Debug, Clone)]
pub struct PartialSummary {
    /// Ordinal of the chunk this summary was produced from.
    pub ordinal: usize,
    pub text: String,
}

/// Per-chunk summarization against the completion service.
pub struct MapStage {
    provider: Arc<dyn LlmProvider>,
    prompt: PromptTemplate,
    opts: CallOptions,
}

impl MapStage {
    pub fn new(provider: Arc<dyn LlmProvider>, prompt: PromptTemplate, opts: CallOptions) -> Self {
        Self {
            provider,
            prompt,
            opts,
        }
    }

    /// Summarize one chunk. The service's response text is returned verbatim.
    pub async fn summarize_chunk(&self, chunk: &Chunk) -> Result<PartialSummary, LlmError> {
        let prompt = self.prompt.render(&chunk.content);
        let text = complete_with_retry(&self.provider, prompt, &self.opts).await?;
        Ok(PartialSummary {
            ordinal: chunk.ordinal,
            text,
        })
    }
}
