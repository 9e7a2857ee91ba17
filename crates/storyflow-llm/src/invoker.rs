//! One generation call in unary or streaming mode

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::extraction::{NarrativeProbe, last_json_object};
use crate::types::{LlmBackend, LlmInvocation, StreamObserver};
use storyflow_utils::error::LlmError;
use storyflow_utils::types::InvocationMode;

/// Receives the narrative items seen so far while a stream is still arriving
pub type PartialNarrativeCallback = dyn Fn(Vec<String>) + Send + Sync;

/// Issues a single backend call and turns the response into candidate text.
///
/// Holds no retry logic: a failure here is reported once and the caller
/// decides what to do with it.
#[derive(Clone)]
pub struct BackendInvoker {
    backend: Arc<dyn LlmBackend>,
}

impl std::fmt::Debug for BackendInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendInvoker").finish_non_exhaustive()
    }
}

impl BackendInvoker {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Run one call and return the last JSON object in the response.
    ///
    /// In streaming mode `on_partial` is told about narrative items as soon
    /// as the array opens and whenever another item completes.
    ///
    /// # Errors
    ///
    /// - Any transport or provider error from the backend
    /// - `LlmError::Cancelled` when `cancel` fires first
    /// - `LlmError::MalformedOutput` when the response holds no JSON object
    pub async fn invoke(
        &self,
        inv: LlmInvocation,
        mode: InvocationMode,
        on_partial: Option<&PartialNarrativeCallback>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let span = info_span!("invoke", mode = %mode, model = %inv.sampling.model);

        let result = async {
            match mode {
                InvocationMode::Unary => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => Err(LlmError::Cancelled),
                        result = self.backend.invoke(inv) => result,
                    }
                }
                InvocationMode::Streaming => {
                    let observer = ProbeObserver::new(on_partial);
                    self.backend.invoke_stream(inv, &observer, cancel).await
                }
            }
        }
        .instrument(span)
        .await?;

        debug!(
            provider = %result.provider,
            model = %result.model_used,
            response_len = result.raw_response.len(),
            "Backend call completed"
        );

        last_json_object(&result.raw_response)
            .map(str::to_string)
            .ok_or_else(|| LlmError::MalformedOutput("no JSON object found in response".to_string()))
    }
}

/// Accumulates fragments and forwards narrative progress
struct ProbeObserver<'a> {
    state: Mutex<(String, NarrativeProbe)>,
    on_partial: Option<&'a PartialNarrativeCallback>,
}

impl<'a> ProbeObserver<'a> {
    fn new(on_partial: Option<&'a PartialNarrativeCallback>) -> Self {
        Self {
            state: Mutex::new((String::new(), NarrativeProbe::new())),
            on_partial,
        }
    }
}

impl StreamObserver for ProbeObserver<'_> {
    fn on_fragment(&self, fragment: &str) {
        let Some(callback) = self.on_partial else {
            return;
        };
        let items = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let (buffer, probe) = &mut *state;
            buffer.push_str(fragment);
            probe.observe(buffer)
        };
        if let Some(items) = items {
            callback(items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptStep, ScriptedBackend};
    use crate::types::{Message, SamplingParameters};
    use std::time::Duration;

    fn invocation() -> LlmInvocation {
        LlmInvocation::new(
            "p1",
            Duration::from_secs(30),
            vec![Message::system("rules"), Message::user("input")],
            SamplingParameters {
                model: "test-model".to_string(),
                temperature: 0.1,
                max_tokens: 100,
            },
        )
    }

    #[tokio::test]
    async fn test_unary_extracts_candidate() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptStep::Respond(
            "Sure! {\"stories\":[\"a\"]} hope that helps".to_string(),
        )]));
        let invoker = BackendInvoker::new(backend.clone());

        let candidate = invoker
            .invoke(invocation(), InvocationMode::Unary, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(candidate, "{\"stories\":[\"a\"]}");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_response_without_object_is_malformed() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptStep::Respond(
            "I cannot help with that".to_string(),
        )]));
        let invoker = BackendInvoker::new(backend);

        let err = invoker
            .invoke(invocation(), InvocationMode::Unary, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_streaming_reports_partial_items_early() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptStep::Stream(vec![
            "{\"stories\": [".to_string(),
            "\"Given a user\", ".to_string(),
            "\"When they log in\"], \"flow\": {\"nodes\": [], \"edges\": []}}".to_string(),
        ])]));
        let invoker = BackendInvoker::new(backend);
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let callback = move |items: Vec<String>| sink.lock().unwrap().push(items);

        let candidate = invoker
            .invoke(
                invocation(),
                InvocationMode::Streaming,
                Some(&callback),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(candidate.starts_with("{\"stories\""));
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], Vec::<String>::new());
        assert_eq!(seen[1], vec!["Given a user".to_string()]);
        assert_eq!(
            seen.last().unwrap(),
            &vec!["Given a user".to_string(), "When they log in".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_slow_call() {
        let backend = Arc::new(
            ScriptedBackend::new(vec![ScriptStep::Respond("{}".to_string())])
                .with_delay(Duration::from_secs(60)),
        );
        let invoker = BackendInvoker::new(backend);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        for mode in [InvocationMode::Unary, InvocationMode::Streaming] {
            let err = invoker
                .invoke(invocation(), mode, None, &cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, LlmError::Cancelled), "{mode}: {err:?}");
        }
    }
}
