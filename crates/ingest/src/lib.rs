pub mod chunker;
pub mod document;

pub use chunker::{split, Chunk, ChunkConfig, ChunkError};
pub use document::{extract_text, ExtractedDocument, ExtractionError, PageContent};
