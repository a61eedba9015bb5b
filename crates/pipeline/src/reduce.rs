//! Reduce stage: recursive collapse of partial summaries under a token budget.
//!
//! The joined summaries either fit the budget (terminal case, one combine
//! call) or are greedily packed into consecutive groups that each fit, every
//! group collapsed with one call using the same template, recursing on the
//! collapsed outputs. Collapse calls within a level run concurrently.

use std::sync::Arc;

use distill_core::TokenCounter;
use distill_llm::LlmProvider;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::calls::{complete_with_retry, CallOptions};
use crate::cancel::CancelHandle;
use crate::error::PipelineError;
use crate::progress::{Observer, Progress};
use crate::prompt::PromptTemplate;

/// Separator between summaries joined into one reduce prompt.
const SUMMARY_SEPARATOR: &str = "\n\n";

/// Cap on collapse levels, so a completion service that fails to shorten its
/// input cannot recurse forever. Normal inputs converge in a handful of
/// levels (group counts shrink geometrically).
const MAX_COLLAPSE_LEVELS: usize = 16;

#[derive(Debug)]
pub(crate) struct ReduceOutcome {
    pub text: String,
    /// Completion calls issued, final combine included.
    pub calls: usize,
    /// Collapse levels run before the terminal combine.
    pub levels: usize,
}

pub(crate) struct Reducer {
    pub provider: Arc<dyn LlmProvider>,
    pub prompt: PromptTemplate,
    pub opts: CallOptions,
    pub counter: TokenCounter,
    pub token_max: usize,
    pub limiter: Arc<Semaphore>,
    pub cancel: CancelHandle,
    pub observer: Arc<dyn Observer>,
}

impl Reducer {
    /// Reduce `summaries` to one text within the token budget.
    pub async fn reduce(&self, summaries: Vec<String>) -> Result<ReduceOutcome, PipelineError> {
        let mut current = summaries;
        let mut calls = 0usize;
        let mut levels = 0usize;

        loop {
            // A single summary over the budget cannot be shrunk by grouping.
            if let Some(size) = current
                .iter()
                .map(|s| self.counter.count(s))
                .find(|&n| n > self.token_max)
            {
                return Err(PipelineError::ReduceBudgetExceeded {
                    size,
                    token_max: self.token_max,
                });
            }

            let joined = current.join(SUMMARY_SEPARATOR);
            let joined_size = self.counter.count(&joined);
            if joined_size <= self.token_max {
                // Terminal case: one combine call over the joined text.
                let text = self.collapse(joined, levels, 0).await?;
                calls += 1;
                return Ok(ReduceOutcome {
                    text,
                    calls,
                    levels,
                });
            }

            if levels >= MAX_COLLAPSE_LEVELS {
                return Err(PipelineError::ReduceBudgetExceeded {
                    size: joined_size,
                    token_max: self.token_max,
                });
            }

            let groups = pack_groups(&current, self.token_max, self.counter);
            levels += 1;
            self.observer.on_progress(&Progress::CollapseLevelStarted {
                level: levels,
                groups: groups.len(),
            });
            debug!(level = levels, groups = groups.len(), "collapsing summaries");

            let futures: Vec<_> = groups
                .iter()
                .enumerate()
                .map(|(group_idx, group)| {
                    self.collapse(group.join(SUMMARY_SEPARATOR), levels, group_idx)
                })
                .collect();

            let results = join_all(futures).await;
            calls += results.len();

            let mut next = Vec::with_capacity(results.len());
            for result in results {
                next.push(result?);
            }
            current = next;
        }
    }

    /// One collapse/combine call over already-joined text, gated by the
    /// shared concurrency limiter and the cancel flag.
    async fn collapse(
        &self,
        joined: String,
        level: usize,
        group: usize,
    ) -> Result<String, PipelineError> {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Err(PipelineError::Cancelled),
        };
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let prompt = self.prompt.render(&joined);
        let text = complete_with_retry(&self.provider, prompt, &self.opts)
            .await
            .map_err(|source| PipelineError::ReduceStage {
                level,
                group,
                source,
            })?;
        self.observer
            .on_progress(&Progress::CollapseCallFinished { level, group });
        Ok(text)
    }
}

/// Greedily pack consecutive summaries into groups whose joined size stays
/// within `token_max`. Summaries are never reordered; a group is flushed
/// when adding the next summary would exceed the budget.
pub(crate) fn pack_groups(
    summaries: &[String],
    token_max: usize,
    counter: TokenCounter,
) -> Vec<Vec<String>> {
    let sep = counter.count(SUMMARY_SEPARATOR);
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut group: Vec<String> = Vec::new();
    let mut group_size = 0usize;

    for summary in summaries {
        let n = counter.count(summary);
        if !group.is_empty() && group_size + sep + n > token_max {
            groups.push(std::mem::take(&mut group));
            group_size = 0;
        }
        group_size += if group.is_empty() { n } else { sep + n };
        group.push(summary.clone());
    }
    if !group.is_empty() {
        groups.push(group);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{service_error, FakeProvider, RecordingObserver};
    use distill_llm::LlmError;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn reducer(provider: Arc<FakeProvider>, token_max: usize) -> Reducer {
        Reducer {
            provider,
            prompt: PromptTemplate::default_reduce(),
            opts: CallOptions::default(),
            counter: TokenCounter::Words,
            token_max,
            limiter: Arc::new(Semaphore::new(4)),
            cancel: CancelHandle::new(),
            observer: Arc::new(RecordingObserver::new()),
        }
    }

    // ── Greedy packing ──────────────────────────────────────────────

    #[test]
    fn packs_pairs_under_the_budget() {
        // 10 summaries of 500 words with token_max 1200: two fit (1000),
        // a third would make 1500, so groups of two.
        let summaries: Vec<String> = (0..10).map(|_| words(500)).collect();
        let groups = pack_groups(&summaries, 1200, TokenCounter::Words);
        assert_eq!(groups.len(), 5);
        for group in &groups {
            assert_eq!(group.len(), 2);
        }
    }

    #[test]
    fn packing_preserves_order() {
        let summaries: Vec<String> = vec!["a a a".into(), "b".into(), "c c c".into()];
        let groups = pack_groups(&summaries, 4, TokenCounter::Words);
        let flat: Vec<String> = groups.into_iter().flatten().collect();
        assert_eq!(flat, summaries);
    }

    #[test]
    fn char_counting_accounts_for_the_separator() {
        // Two 4-char summaries joined are 10 chars with the separator.
        let summaries: Vec<String> = vec!["aaaa".into(), "bbbb".into()];
        assert_eq!(pack_groups(&summaries, 9, TokenCounter::Chars).len(), 2);
        assert_eq!(pack_groups(&summaries, 10, TokenCounter::Chars).len(), 1);
    }

    // ── Terminal case ───────────────────────────────────────────────

    #[tokio::test]
    async fn small_input_makes_exactly_one_call() {
        let provider = Arc::new(FakeProvider::new(|_, _| Ok("final".into())));
        let counted = provider.clone();
        let outcome = reducer(provider, 1000)
            .reduce(vec![words(10), words(10)])
            .await
            .unwrap();
        assert_eq!(outcome.text, "final");
        assert_eq!(outcome.calls, 1);
        assert_eq!(outcome.levels, 0);
        assert_eq!(counted.call_count(), 1);
        // The one combine call sees both summaries.
        assert!(counted.prompts()[0].contains("w9"));
    }

    // ── Collapse and recursion ──────────────────────────────────────

    #[tokio::test]
    async fn collapse_level_then_terminal_combine() {
        // 10 x 500 words, budget 1200: 5 collapse calls, then one combine.
        let provider = Arc::new(FakeProvider::new(|_, _| Ok("collapsed summary".into())));
        let counted = provider.clone();
        let summaries: Vec<String> = (0..10).map(|_| words(500)).collect();
        let outcome = reducer(provider, 1200).reduce(summaries).await.unwrap();
        assert_eq!(outcome.levels, 1);
        assert_eq!(outcome.calls, 6);
        assert_eq!(counted.call_count(), 6);
    }

    #[tokio::test]
    async fn recursion_depth_is_logarithmic() {
        // 8 summaries of 300 words, budget 600: pairs halve each level
        // while the fake keeps answering 300 words.
        let provider = Arc::new(FakeProvider::new(|_, _| Ok(words(300))));
        let summaries: Vec<String> = (0..8).map(|_| words(300)).collect();
        let outcome = reducer(provider, 600).reduce(summaries).await.unwrap();
        // 8 -> 4 -> 2, then the joined pair fits: two collapse levels.
        assert_eq!(outcome.levels, 2);
        assert_eq!(outcome.calls, 4 + 2 + 1);
    }

    // ── Budget failures ─────────────────────────────────────────────

    #[tokio::test]
    async fn oversized_single_summary_fails_without_calls() {
        let provider = Arc::new(FakeProvider::new(|_, _| Ok("unused".into())));
        let counted = provider.clone();
        let err = reducer(provider, 100)
            .reduce(vec![words(10), words(200)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ReduceBudgetExceeded {
                size: 200,
                token_max: 100
            }
        ));
        assert_eq!(counted.call_count(), 0);
    }

    #[tokio::test]
    async fn non_shrinking_service_hits_the_level_cap() {
        // The fake echoes 90 words back, so singleton groups never shrink
        // below the joined budget and the level cap must stop the loop.
        let provider = Arc::new(FakeProvider::new(|_, _| Ok(words(90))));
        let summaries: Vec<String> = (0..3).map(|_| words(90)).collect();
        let err = reducer(provider, 100).reduce(summaries).await.unwrap_err();
        assert!(matches!(err, PipelineError::ReduceBudgetExceeded { .. }));
    }

    // ── Service failures ────────────────────────────────────────────

    #[tokio::test]
    async fn collapse_failure_is_typed_with_level_and_group() {
        let provider = Arc::new(FakeProvider::new(|idx, _| {
            if idx == 1 {
                Err(service_error())
            } else {
                Ok("collapsed".into())
            }
        }));
        let summaries: Vec<String> = (0..4).map(|_| words(80)).collect();
        let err = reducer(provider, 100).reduce(summaries).await.unwrap_err();
        match err {
            PipelineError::ReduceStage { level, source, .. } => {
                assert_eq!(level, 1);
                assert!(matches!(source, LlmError::Api { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn cancelled_reduce_issues_no_calls() {
        let provider = Arc::new(FakeProvider::new(|_, _| Ok("unused".into())));
        let counted = provider.clone();
        let r = reducer(provider, 1000);
        r.cancel.cancel();
        let err = r.reduce(vec![words(10)]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(counted.call_count(), 0);
    }
}
