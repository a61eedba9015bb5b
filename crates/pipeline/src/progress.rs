//! Structured progress events emitted during a run.
//!
//! The pipeline reports what it is doing through an injected [`Observer`]
//! rather than printing; the default observer forwards events to `tracing`.

use std::fmt;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Chunking,
    Mapping,
    Reducing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Chunking => write!(f, "chunking"),
            Stage::Mapping => write!(f, "mapping"),
            Stage::Reducing => write!(f, "reducing"),
        }
    }
}

/// One progress event. Per-call events carry enough context to correlate
/// with the failing item if the run later errors out.
#[derive(Debug, Clone)]
pub enum Progress {
    StageStarted { stage: Stage },
    ChunkingFinished { chunks: usize },
    MapCallFinished { ordinal: usize, total: usize },
    CollapseLevelStarted { level: usize, groups: usize },
    CollapseCallFinished { level: usize, group: usize },
    RunFinished,
    RunFailed { stage: Stage },
}

/// Sink for progress events.
pub trait Observer: Send + Sync {
    fn on_progress(&self, event: &Progress);
}

/// Default observer: forwards events to `tracing`.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_progress(&self, event: &Progress) {
        match event {
            Progress::StageStarted { stage } => tracing::info!("{stage} started"),
            Progress::ChunkingFinished { chunks } => {
                tracing::info!("document split into {chunks} chunks")
            }
            Progress::MapCallFinished { ordinal, total } => {
                tracing::debug!("map call {}/{} finished", ordinal + 1, total)
            }
            Progress::CollapseLevelStarted { level, groups } => {
                tracing::info!("collapse level {level}: {groups} groups")
            }
            Progress::CollapseCallFinished { level, group } => {
                tracing::debug!("collapse call finished (level {level}, group {group})")
            }
            Progress::RunFinished => tracing::info!("summarization finished"),
            Progress::RunFailed { stage } => {
                tracing::warn!("summarization failed during {stage}")
            }
        }
    }
}
