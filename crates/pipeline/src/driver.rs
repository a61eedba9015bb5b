//! Pipeline driver: split, concurrent map fan-out, recursive reduce.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use distill_core::config::Config;
use distill_ingest::chunker::{self, Chunk, ChunkConfig};
use distill_llm::{LlmError, LlmProvider};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::calls::{CallOptions, RetryPolicy};
use crate::cancel::CancelHandle;
use crate::error::PipelineError;
use crate::map::{MapStage, PartialSummary};
use crate::progress::{Observer, Progress, Stage, TracingObserver};
use crate::prompt::PromptTemplate;
use crate::reduce::Reducer;

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk: ChunkConfig,
    /// Maximum text size passed to one reduce-stage completion call.
    pub token_max: usize,
    /// Concurrent completion calls in flight.
    pub concurrency: usize,
    pub calls: CallOptions,
    pub map_prompt: PromptTemplate,
    pub reduce_prompt: PromptTemplate,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            token_max: 16000,
            concurrency: 4,
            calls: CallOptions::default(),
            map_prompt: PromptTemplate::default_map(),
            reduce_prompt: PromptTemplate::default_reduce(),
        }
    }
}

impl PipelineConfig {
    /// Build from the environment-driven config, loading any prompt template
    /// overrides from disk.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let s = &config.summarize;
        let map_prompt = match &s.map_prompt_path {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default_map(),
        };
        let reduce_prompt = match &s.reduce_prompt_path {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default_reduce(),
        };
        Ok(Self {
            chunk: ChunkConfig {
                max_size: s.chunk_size,
                overlap: s.chunk_overlap,
                counter: s.tokenizer,
            },
            token_max: s.token_max,
            concurrency: s.concurrency.max(1),
            calls: CallOptions {
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
                retry: RetryPolicy {
                    max_retries: s.max_retries,
                    backoff: Duration::from_millis(s.retry_backoff_ms),
                },
            },
            map_prompt,
            reduce_prompt,
        })
    }
}

/// Terminal artifact of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct FinalSummary {
    pub summary: String,
    pub stats: RunStats,
}

/// Counts describing how a run unfolded.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    pub chunks: usize,
    pub map_calls: usize,
    /// Collapse calls plus the final combine call.
    pub reduce_calls: usize,
    pub collapse_levels: usize,
}

/// Orchestrates Chunker -> Map -> Reduce over one document.
pub struct Pipeline {
    provider: Arc<dyn LlmProvider>,
    config: PipelineConfig,
    observer: Arc<dyn Observer>,
    cancel: CancelHandle,
}

enum MapResult {
    Done(PartialSummary),
    Failed { ordinal: usize, source: LlmError },
    Cancelled,
    Skipped,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self::with_observer(provider, config, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        provider: Arc<dyn LlmProvider>,
        config: PipelineConfig,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            provider,
            config,
            observer,
            cancel: CancelHandle::new(),
        }
    }

    /// Handle that cooperatively stops this pipeline's runs.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the full pipeline over `text` and return the consolidated summary.
    pub async fn run(&self, text: &str) -> Result<FinalSummary, PipelineError> {
        let mut stage = Stage::Chunking;
        let result = self.run_stages(text, &mut stage).await;
        match &result {
            Ok(_) => self.observer.on_progress(&Progress::RunFinished),
            Err(_) => self.observer.on_progress(&Progress::RunFailed { stage }),
        }
        result
    }

    async fn run_stages(
        &self,
        text: &str,
        stage: &mut Stage,
    ) -> Result<FinalSummary, PipelineError> {
        self.observer.on_progress(&Progress::StageStarted {
            stage: Stage::Chunking,
        });
        let chunks = chunker::split(text, &self.config.chunk)?;
        self.observer.on_progress(&Progress::ChunkingFinished {
            chunks: chunks.len(),
        });

        if chunks.is_empty() {
            // Nothing to summarize; no completion call is issued.
            return Ok(FinalSummary {
                summary: String::new(),
                stats: RunStats::default(),
            });
        }

        *stage = Stage::Mapping;
        self.observer.on_progress(&Progress::StageStarted {
            stage: Stage::Mapping,
        });
        let limiter = Arc::new(Semaphore::new(self.config.concurrency));
        let partials = self.map_all(&chunks, limiter.clone()).await?;

        *stage = Stage::Reducing;
        self.observer.on_progress(&Progress::StageStarted {
            stage: Stage::Reducing,
        });
        let reducer = Reducer {
            provider: self.provider.clone(),
            prompt: self.config.reduce_prompt.clone(),
            opts: self.config.calls.clone(),
            counter: self.config.chunk.counter,
            token_max: self.config.token_max,
            limiter,
            cancel: self.cancel.clone(),
            observer: self.observer.clone(),
        };
        let summaries: Vec<String> = partials.into_iter().map(|p| p.text).collect();
        let outcome = reducer.reduce(summaries).await?;

        Ok(FinalSummary {
            summary: outcome.text,
            stats: RunStats {
                chunks: chunks.len(),
                map_calls: chunks.len(),
                reduce_calls: outcome.calls,
                collapse_levels: outcome.levels,
            },
        })
    }

    /// Summarize every chunk concurrently under the limiter, preserving
    /// chunk order in the output. After the first failure no further call
    /// is dispatched.
    async fn map_all(
        &self,
        chunks: &[Chunk],
        limiter: Arc<Semaphore>,
    ) -> Result<Vec<PartialSummary>, PipelineError> {
        let map_stage = MapStage::new(
            self.provider.clone(),
            self.config.map_prompt.clone(),
            self.config.calls.clone(),
        );
        let abort = Arc::new(AtomicBool::new(false));
        let total = chunks.len();

        let futures: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let limiter = limiter.clone();
                let abort = abort.clone();
                let map_stage = &map_stage;
                let cancel = &self.cancel;
                let observer = &self.observer;
                async move {
                    let _permit = match limiter.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return MapResult::Skipped,
                    };
                    if cancel.is_cancelled() {
                        return MapResult::Cancelled;
                    }
                    if abort.load(Ordering::SeqCst) {
                        return MapResult::Skipped;
                    }
                    match map_stage.summarize_chunk(chunk).await {
                        Ok(partial) => {
                            observer.on_progress(&Progress::MapCallFinished {
                                ordinal: partial.ordinal,
                                total,
                            });
                            MapResult::Done(partial)
                        }
                        Err(source) => {
                            abort.store(true, Ordering::SeqCst);
                            MapResult::Failed {
                                ordinal: chunk.ordinal,
                                source,
                            }
                        }
                    }
                }
            })
            .collect();

        // join_all keeps input order, so partials stay in chunk order.
        let results = join_all(futures).await;

        let mut partials = Vec::with_capacity(results.len());
        let mut failure: Option<PipelineError> = None;
        for result in results {
            match result {
                MapResult::Done(partial) => partials.push(partial),
                MapResult::Failed { ordinal, source } => {
                    if failure.is_none() {
                        failure = Some(PipelineError::MapStage { ordinal, source });
                    }
                }
                MapResult::Cancelled | MapResult::Skipped => {}
            }
        }

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(partials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::DEFAULT_REDUCE_TEMPLATE;
    use crate::test_support::{service_error, FakeProvider, RecordingObserver};
    use distill_core::TokenCounter;

    fn text_of(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn config(max_size: usize, token_max: usize) -> PipelineConfig {
        PipelineConfig {
            chunk: ChunkConfig {
                max_size,
                overlap: 0,
                counter: TokenCounter::Words,
            },
            token_max,
            concurrency: 4,
            ..PipelineConfig::default()
        }
    }

    /// First numbered word ("w<digits>") in the prompt, marking which chunk
    /// the call saw.
    fn chunk_marker(prompt: &str) -> String {
        prompt
            .split_whitespace()
            .find(|w| {
                w.starts_with('w') && w.len() > 1 && w[1..].chars().all(|c| c.is_ascii_digit())
            })
            .unwrap_or("?")
            .to_string()
    }

    fn echo_provider() -> Arc<FakeProvider> {
        Arc::new(FakeProvider::new(|_, prompt| {
            Ok(format!("theme-{}", chunk_marker(prompt)))
        }))
    }

    // ── End-to-end ──────────────────────────────────────────────────

    #[tokio::test]
    async fn three_chunks_make_three_map_calls_and_one_reduce_call() {
        let provider = echo_provider();
        let counted = provider.clone();
        let pipeline = Pipeline::new(provider, config(10, 16000));

        let result = pipeline.run(&text_of(30)).await.unwrap();

        assert_eq!(result.stats.chunks, 3);
        assert_eq!(result.stats.map_calls, 3);
        assert_eq!(result.stats.reduce_calls, 1);
        assert_eq!(result.stats.collapse_levels, 0);
        assert_eq!(counted.call_count(), 4);

        // The reduce prompt carries the partial summaries in chunk order.
        let prompts = counted.prompts();
        let reduce_prompt = prompts
            .iter()
            .find(|p| p.contains("set of summaries"))
            .expect("reduce call missing");
        let p0 = reduce_prompt.find("theme-w0").unwrap();
        let p1 = reduce_prompt.find("theme-w10").unwrap();
        let p2 = reduce_prompt.find("theme-w20").unwrap();
        assert!(p0 < p1 && p1 < p2);
    }

    #[tokio::test]
    async fn invalid_chunk_config_fails_before_any_call() {
        let provider = echo_provider();
        let counted = provider.clone();
        let pipeline = Pipeline::new(provider, config(0, 16000));

        let err = pipeline.run("some text").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert_eq!(counted.call_count(), 0);
    }

    #[tokio::test]
    async fn map_failure_surfaces_ordinal_and_skips_reduce() {
        // Chunk 1 holds w10..w19; fail any call that sees it.
        let provider = Arc::new(FakeProvider::new(|_, prompt| {
            if prompt.contains("w10") && !prompt.contains("summaries") {
                Err(service_error())
            } else {
                Ok(format!("theme-{}", chunk_marker(prompt)))
            }
        }));
        let counted = provider.clone();
        let pipeline = Pipeline::new(provider, config(10, 16000));

        let err = pipeline.run(&text_of(30)).await.unwrap_err();
        match err {
            PipelineError::MapStage { ordinal, source } => {
                assert_eq!(ordinal, 1);
                assert!(matches!(source, distill_llm::LlmError::Api { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        // No reduce call was issued.
        assert!(counted
            .prompts()
            .iter()
            .all(|p| !p.contains("set of summaries")));
    }

    #[tokio::test]
    async fn empty_input_completes_without_calls() {
        let provider = echo_provider();
        let counted = provider.clone();
        let pipeline = Pipeline::new(provider, config(10, 16000));

        let result = pipeline.run("").await.unwrap();
        assert_eq!(result.summary, "");
        assert_eq!(result.stats.chunks, 0);
        assert_eq!(counted.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_run_issues_no_calls() {
        let provider = echo_provider();
        let counted = provider.clone();
        let pipeline = Pipeline::new(provider, config(10, 16000));

        pipeline.cancel_handle().cancel();
        let err = pipeline.run(&text_of(30)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(counted.call_count(), 0);
    }

    // ── Progress events ─────────────────────────────────────────────

    #[tokio::test]
    async fn stages_are_reported_in_order() {
        let observer = Arc::new(RecordingObserver::new());
        let pipeline =
            Pipeline::with_observer(echo_provider(), config(10, 16000), observer.clone());
        pipeline.run(&text_of(30)).await.unwrap();

        let stages: Vec<Stage> = observer
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Progress::StageStarted { stage } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![Stage::Chunking, Stage::Mapping, Stage::Reducing]);

        let events = observer.events.lock().unwrap();
        assert!(matches!(events.last(), Some(Progress::RunFinished)));
    }

    #[tokio::test]
    async fn failures_report_the_failing_stage() {
        let observer = Arc::new(RecordingObserver::new());
        let provider = Arc::new(FakeProvider::new(|_, _| {
            Err::<String, _>(service_error())
        }));
        let pipeline = Pipeline::with_observer(provider, config(10, 16000), observer.clone());
        pipeline.run(&text_of(30)).await.unwrap_err();

        let events = observer.events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(Progress::RunFailed {
                stage: Stage::Mapping
            })
        ));
    }

    // ── Config plumbing ─────────────────────────────────────────────

    #[test]
    fn default_reduce_template_matches_builtin() {
        let rendered = PipelineConfig::default().reduce_prompt.render("X");
        assert_eq!(rendered, DEFAULT_REDUCE_TEMPLATE.replace("<<<docs>>>", "X"));
    }
}
