//! Scripted fake completion backend shared by pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use distill_llm::{LlmError, LlmProvider, Message};

type RespondFn = Box<dyn Fn(usize, &str) -> Result<String, LlmError> + Send + Sync>;

/// Fake backend: records every prompt and answers from a scripted closure
/// receiving `(call_index, prompt)`.
pub(crate) struct FakeProvider {
    prompts: Mutex<Vec<String>>,
    counter: AtomicUsize,
    respond: RespondFn,
}

impl std::fmt::Debug for FakeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeProvider")
            .field("prompts", &self.prompts)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl FakeProvider {
    pub fn new(
        respond: impl Fn(usize, &str) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            respond: Box::new(respond),
        }
    }

    /// Fail the first `n` calls with a service error, then answer `reply`.
    pub fn failing_first(n: usize, reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |idx, _| {
            if idx < n {
                Err(service_error())
            } else {
                Ok(reply.clone())
            }
        })
    }

    /// Total completion calls seen so far.
    pub fn call_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// Recorded prompts, in completion order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let idx = self.counter.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        (self.respond)(idx, &prompt)
    }
}

pub(crate) fn service_error() -> LlmError {
    LlmError::Api {
        status: 500,
        body: "scripted failure".to_string(),
    }
}

/// Observer capturing every event for assertions.
pub(crate) struct RecordingObserver {
    pub events: Mutex<Vec<crate::progress::Progress>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl crate::progress::Observer for RecordingObserver {
    fn on_progress(&self, event: &crate::progress::Progress) {
        self.events.lock().unwrap().push(event.clone());
    }
}
