use distill_ingest::chunker::ChunkError;
use distill_llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad chunk/overlap/token-budget parameters. Raised before any
    /// completion call is issued.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A chunk's summarization call failed after exhausting retries.
    #[error("map stage failed on chunk {ordinal}: {source}")]
    MapStage {
        ordinal: usize,
        #[source]
        source: LlmError,
    },

    /// A collapse or combine call failed after exhausting retries.
    #[error("reduce stage failed at level {level}, group {group}: {source}")]
    ReduceStage {
        level: usize,
        group: usize,
        #[source]
        source: LlmError,
    },

    /// Text cannot be reduced to fit the token budget.
    #[error("cannot reduce within token budget: {size} units exceed token_max {token_max}")]
    ReduceBudgetExceeded { size: usize, token_max: usize },

    /// The run was cancelled before completion.
    #[error("summarization run cancelled")]
    Cancelled,
}

impl From<ChunkError> for PipelineError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::InvalidConfig(reason) => PipelineError::InvalidConfig(reason),
        }
    }
}
