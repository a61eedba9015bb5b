//! Budgeted text splitting for the summarization pipeline.
//!
//! Splits raw document text into an ordered sequence of chunks, each at most
//! `max_size` units as measured by the configured [`TokenCounter`]. Word
//! counting prefers paragraph and sentence boundaries before falling back to
//! fixed-size word packing; character counting uses exact sliding windows.
//! No unit of the input is ever dropped.

mod helpers;


use distill_core::TokenCounter;
use thiserror::Error;

/// Configuration for the chunking stage.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum units per chunk, overlap included.
    pub max_size: usize,
    /// Trailing units of a chunk repeated at the start of the next chunk.
    pub overlap: usize,
    /// Unit in which chunk sizes are measured.
    pub counter: TokenCounter,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_size: 12000,
            overlap: 0,
            counter: TokenCounter::Words,
        }
    }
}

/// A bounded slice of document text.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based position within the document; ordering is significant.
    pub ordinal: usize,
    /// The chunk text, overlap prefix included.
    pub content: String,
    /// Size of `content` in the configured unit.
    pub size: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunk configuration: {0}")]
    InvalidConfig(String),
}

/// Split `text` into ordered chunks of at most `config.max_size` units.
///
/// Input with no countable units yields an empty sequence; any other input
/// yields at least one chunk. Removing each successor's overlap prefix and
/// concatenating the chunk contents reconstructs the input's unit sequence.
pub fn split(text: &str, config: &ChunkConfig) -> Result<Vec<Chunk>, ChunkError> {
    if config.max_size == 0 {
        return Err(ChunkError::InvalidConfig(
            "max_size must be positive".to_string(),
        ));
    }
    if config.overlap >= config.max_size {
        return Err(ChunkError::InvalidConfig(format!(
            "overlap ({}) must be smaller than max_size ({})",
            config.overlap, config.max_size
        )));
    }
    if config.counter.count(text) == 0 {
        return Ok(Vec::new());
    }

    let contents = match config.counter {
        TokenCounter::Words => helpers::split_words(text, config.max_size, config.overlap),
        TokenCounter::Chars => helpers::split_chars(text, config.max_size, config.overlap),
    };

    Ok(contents
        .into_iter()
        .enumerate()
        .map(|(ordinal, content)| {
            let size = config.counter.count(&content);
            Chunk {
                ordinal,
                content,
                size,
            }
        })
        .collect())
}
