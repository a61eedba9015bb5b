//! Shared completion-call plumbing: a rendered prompt in, response text out,
//! with bounded retry applied per call.

use std::sync::Arc;
use std::time::Duration;

use distill_llm::{LlmError, LlmProvider, Message};
use tracing::warn;

/// Bounded retry-with-backoff applied to each completion call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per subsequent attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Per-call parameters shared by the map and reduce stages.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry: RetryPolicy,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
            retry: RetryPolicy::default(),
        }
    }
}

/// Issue one completion call, retrying per the policy.
pub(crate) async fn complete_with_retry(
    provider: &Arc<dyn LlmProvider>,
    prompt: String,
    opts: &CallOptions,
) -> Result<String, LlmError> {
    let mut backoff = opts.retry.backoff;
    let mut attempt = 0u32;
    loop {
        let messages = vec![Message::user(prompt.clone())];
        match provider
            .complete(messages, opts.temperature, opts.max_tokens)
            .await
        {
            Ok(text) => return Ok(text),
            Err(err) if attempt < opts.retry.max_retries => {
                attempt += 1;
                warn!(attempt, error = %err, "completion call failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProvider;

    fn opts(max_retries: u32) -> CallOptions {
        CallOptions {
            retry: RetryPolicy {
                max_retries,
                backoff: Duration::from_millis(1),
            },
            ..CallOptions::default()
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let provider = FakeProvider::failing_first(2, "ok");
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);
        let result = complete_with_retry(&provider, "prompt".into(), &opts(2)).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn zero_retries_fails_on_first_error() {
        let provider = Arc::new(FakeProvider::failing_first(1, "never"));
        let counted = provider.clone();
        let provider: Arc<dyn LlmProvider> = provider;
        let result = complete_with_retry(&provider, "prompt".into(), &opts(0)).await;
        assert!(result.is_err());
        assert_eq!(counted.call_count(), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let provider = Arc::new(FakeProvider::failing_first(10, "never"));
        let counted = provider.clone();
        let provider: Arc<dyn LlmProvider> = provider;
        let result = complete_with_retry(&provider, "prompt".into(), &opts(3)).await;
        assert!(result.is_err());
        // One initial attempt plus three retries.
        assert_eq!(counted.call_count(), 4);
    }
}
