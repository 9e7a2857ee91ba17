//! Scripted backend for tests that must not reach the network

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::types::{LlmBackend, LlmInvocation, LlmResult, StreamObserver};
use storyflow_utils::error::LlmError;

/// One scripted reaction to a backend call
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return this whole body
    Respond(String),
    /// Fail with this error
    Fail(LlmError),
    /// Deliver these fragments one by one (joined for unary calls)
    Stream(Vec<String>),
}

/// Backend that replays a fixed script and records what it was asked.
///
/// Steps are consumed in call order. Once the script runs out the fallback
/// response is used if one was set, otherwise the call fails with a
/// transport error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    /// Backend that answers every call with `body`
    #[must_use]
    pub fn always(body: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(body)
    }

    #[must_use]
    pub fn with_fallback(mut self, body: impl Into<String>) -> Self {
        self.fallback = Some(body.into());
        self
    }

    /// Sleep this long (tokio time) before answering each call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Rendered prompt of every call, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn begin(&self, inv: &LlmInvocation) -> InFlight<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(inv.prompt_text());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    fn next_step(&self) -> ScriptStep {
        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (step, &self.fallback) {
            (Some(step), _) => step,
            (None, Some(body)) => ScriptStep::Respond(body.clone()),
            (None, None) => ScriptStep::Fail(LlmError::Transport("script exhausted".to_string())),
        }
    }

    fn result(inv: &LlmInvocation, body: String) -> LlmResult {
        LlmResult::new(body, "scripted", inv.sampling.model.clone())
    }
}

/// Decrements the in-flight counter when the call ends or is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let _guard = self.begin(&inv);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_step() {
            ScriptStep::Respond(body) => Ok(Self::result(&inv, body)),
            ScriptStep::Stream(fragments) => Ok(Self::result(&inv, fragments.concat())),
            ScriptStep::Fail(error) => Err(error),
        }
    }

    async fn invoke_stream(
        &self,
        inv: LlmInvocation,
        observer: &dyn StreamObserver,
        cancel: &CancellationToken,
    ) -> Result<LlmResult, LlmError> {
        let _guard = self.begin(&inv);
        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LlmError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }

        let fragments = match self.next_step() {
            ScriptStep::Respond(body) => vec![body],
            ScriptStep::Stream(fragments) => fragments,
            ScriptStep::Fail(error) => return Err(error),
        };

        let mut accumulated = String::new();
        for fragment in fragments {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            accumulated.push_str(&fragment);
            observer.on_fragment(&fragment);
            tokio::task::yield_now().await;
        }
        Ok(Self::result(&inv, accumulated))
    }
}
