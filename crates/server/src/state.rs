use std::sync::Arc;

use distill_core::Config;
use distill_llm::LlmProvider;

/// Shared application state. The provider client is read-only and safe to
/// share across concurrent requests.
pub struct AppState {
    pub config: Config,
    pub provider: Arc<dyn LlmProvider>,
}
