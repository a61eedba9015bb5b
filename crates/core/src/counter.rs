//! Token counting policy shared by the chunker and the reduce stage.
//!
//! Chunk sizes and the reduce token budget must be measured in the same
//! unit, so the selected counter is part of the pipeline configuration and
//! threaded into both stages.

use serde::{Deserialize, Serialize};

/// Unit in which text size is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCounter {
    /// Whitespace-separated words.
    #[default]
    Words,
    /// Unicode scalar values.
    Chars,
}

impl TokenCounter {
    /// Measure `text` in this counter's unit.
    pub fn count(&self, text: &str) -> usize {
        match self {
            TokenCounter::Words => text.split_whitespace().count(),
            TokenCounter::Chars => text.chars().count(),
        }
    }

    /// Parse a config string ("words" or "chars").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "words" | "word" => Some(TokenCounter::Words),
            "chars" | "char" | "characters" => Some(TokenCounter::Chars),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TokenCounter::Words => "words",
            TokenCounter::Chars => "chars",
        }
    }
}
