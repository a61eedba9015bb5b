//! Prompt templates for the map and reduce completion calls.

use crate::error::PipelineError;

/// Placeholder replaced with the document text when rendering.
pub const DOCS_PLACEHOLDER: &str = "<<<docs>>>";

/// Built-in map prompt: extract the main themes of one chunk.
pub const DEFAULT_MAP_TEMPLATE: &str = "\
The following is a set of documents:

<<<docs>>>

Based on this list of docs, please identify the main themes.
Helpful Answer:";

/// Built-in reduce prompt: consolidate partial summaries. Used for both
/// intermediate collapse calls and the final combine call.
pub const DEFAULT_REDUCE_TEMPLATE: &str = "\
The following is a set of summaries:

<<<docs>>>

Take these and distill it into a final, consolidated summary of the main themes.
Helpful Answer:";

/// A completion prompt with exactly one `<<<docs>>>` placeholder.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Validate and wrap a template string.
    pub fn new(template: impl Into<String>) -> Result<Self, PipelineError> {
        let template = template.into();
        let count = template.matches(DOCS_PLACEHOLDER).count();
        if count != 1 {
            return Err(PipelineError::InvalidConfig(format!(
                "prompt template must contain exactly one '{DOCS_PLACEHOLDER}' placeholder, found {count}"
            )));
        }
        Ok(Self { template })
    }

    /// Load a template from disk, validating the placeholder.
    pub fn from_file(path: &str) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("failed to read prompt template at {path}: {e}"))
        })?;
        Self::new(content)
    }

    pub fn default_map() -> Self {
        Self {
            template: DEFAULT_MAP_TEMPLATE.to_string(),
        }
    }

    pub fn default_reduce() -> Self {
        Self {
            template: DEFAULT_REDUCE_TEMPLATE.to_string(),
        }
    }

    /// Render the template with the document text in place of the placeholder.
    pub fn render(&self, docs: &str) -> String {
        self.template.replace(DOCS_PLACEHOLDER, docs)
    }
}
