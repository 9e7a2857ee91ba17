//! Request pipeline: cache check, admission, invoke, validate, escalate, store

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use crate::inflight::{Claim, InflightRegistry};
use crate::outcome::{ArtifactOrigin, GenerationOutcome};
use crate::prompts::{PromptInstructions, escalation_note};
use crate::retry::BackoffPolicy;
use crate::sinks::{ArtifactStore, GenerationEvent, NotificationSink, NullSink, persist_artifact};
use storyflow_config::{Config, GenerationProfile, STREAMING_PROFILE};
use storyflow_llm::{
    BackendInvoker, ConcurrencyLimiter, LlmBackend, LlmError, LlmInvocation, Message,
    PartialNarrativeCallback, SamplingParameters,
};
use storyflow_redaction::{SanitizedText, Sanitizer};
use storyflow_utils::cache::ResultCache;
use storyflow_utils::error::{ConfigError, GenerationError, ValidationError};
use storyflow_utils::fingerprint::{Fingerprint, Fingerprinter};
use storyflow_utils::logging::generation_span;
use storyflow_utils::types::{Artifact, ExhaustionPolicy, GenerationRequest, InvocationMode};
use storyflow_validation::{QualityGate, Rejection, Verdict};

/// Turns generation requests into validated artifacts.
///
/// The cache, limiter, store and notifier are injected, so several
/// orchestrators can share them or keep them isolated.
pub struct Orchestrator {
    profile_name: String,
    profile: GenerationProfile,
    invoker: BackendInvoker,
    limiter: ConcurrencyLimiter,
    cache: Arc<ResultCache>,
    store: Option<Arc<dyn ArtifactStore>>,
    notifier: Arc<dyn NotificationSink>,
    inflight: Option<Arc<InflightRegistry>>,
    sanitizer: Sanitizer,
    fingerprinter: Fingerprinter,
    gate: QualityGate,
    backoff: BackoffPolicy,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("profile", &self.profile_name)
            .field("coalesce", &self.inflight.is_some())
            .finish_non_exhaustive()
    }
}

/// Transient state of one request's quality loop
struct AttemptState {
    attempt: u32,
    last_candidate: Option<Artifact>,
    instructions: PromptInstructions,
}

/// Transport and backoff bookkeeping across attempts
#[derive(Default)]
struct TransportLog {
    calls: u32,
    delays: Vec<Duration>,
}

enum InvokeFailure {
    /// Response held no usable document; handled like a shape rejection
    Malformed(String),
    Fatal(GenerationError),
}

impl Orchestrator {
    #[must_use]
    pub fn builder(backend: Arc<dyn LlmBackend>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(backend)
    }

    /// Orchestrator for a named profile with components sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownProfile` if the profile does not exist.
    pub fn from_config(
        config: &Config,
        profile: Option<&str>,
        backend: Arc<dyn LlmBackend>,
    ) -> Result<Self, ConfigError> {
        Ok(OrchestratorBuilder::from_config(config, profile, backend)?.build())
    }

    #[must_use]
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    #[must_use]
    pub fn profile(&self) -> &GenerationProfile {
        &self.profile
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    #[must_use]
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// [`generate_with_cancel`](Self::generate_with_cancel) without outside cancellation.
    ///
    /// # Errors
    ///
    /// See [`generate_with_cancel`](Self::generate_with_cancel).
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.generate_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Produce an artifact for `request`.
    ///
    /// The whole call is bounded by the profile's request timeout. Firing
    /// `cancel` or hitting the deadline abandons any admission wait, stream
    /// read or backoff sleep and returns their tickets. Progress and the
    /// terminal event go to the notifier.
    ///
    /// # Errors
    ///
    /// - `GenerationError::Configuration` for credential or setup problems
    /// - `GenerationError::TransportExhausted` when transport retries run out
    /// - `GenerationError::Exhausted` when quality attempts run out under the
    ///   fail policy, or with no parseable candidate under best effort
    /// - `GenerationError::Cancelled` / `GenerationError::Timeout`
    /// - `GenerationError::Persistence` if the store rejects an accepted artifact
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let span = generation_span(&request.subject_id, &self.profile_name);
        let deadline = self.profile.request_timeout();

        async {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(GenerationError::Cancelled),
                timed = tokio::time::timeout(deadline, self.run(request, cancel)) => {
                    timed.unwrap_or(Err(GenerationError::Timeout { duration: deadline }))
                }
            };

            match &result {
                Ok(outcome) => {
                    info!(
                        origin = %outcome.origin,
                        attempts = outcome.attempts,
                        transport_attempts = outcome.transport_attempts,
                        "Generation finished"
                    );
                    self.notifier.notify(GenerationEvent::Completed {
                        subject_id: request.subject_id.clone(),
                        artifact: Arc::clone(&outcome.artifact),
                    });
                }
                Err(error) => {
                    warn!(%error, "Generation failed");
                    self.notifier.notify(GenerationEvent::Failed {
                        subject_id: request.subject_id.clone(),
                        error: error.display_for_user(),
                    });
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let sanitized = self.sanitizer.sanitize(&request.raw_text);
        let fingerprint =
            self.fingerprinter
                .fingerprint(&request.subject_id, &sanitized, &request.domain_profile);
        Span::current().record("fingerprint", fingerprint.short());
        debug!(input_len = sanitized.len(), "Input sanitized");

        loop {
            if let Some(artifact) = self.cache.get(&fingerprint) {
                return Ok(self.serve_cached(request, fingerprint, artifact));
            }

            let Some(registry) = &self.inflight else {
                return self.generate_fresh(request, &sanitized, fingerprint, cancel).await;
            };

            match registry.claim(&fingerprint) {
                Claim::Leader(_guard) => {
                    // The previous leader may have filled the cache since the check above.
                    if let Some(artifact) = self.cache.get(&fingerprint) {
                        return Ok(self.serve_cached(request, fingerprint, artifact));
                    }
                    return self.generate_fresh(request, &sanitized, fingerprint, cancel).await;
                }
                Claim::Follower(waiter) => {
                    debug!("Identical request in flight, waiting for it");
                    waiter.finished().await;
                }
            }
        }
    }

    fn serve_cached(
        &self,
        request: &GenerationRequest,
        fingerprint: Fingerprint,
        artifact: Arc<Artifact>,
    ) -> GenerationOutcome {
        info!("Served from cache");
        // Only streaming callers render progress.
        if self.profile.mode == InvocationMode::Streaming {
            self.notifier.notify(GenerationEvent::Progress {
                subject_id: request.subject_id.clone(),
                narrative_items: artifact.narrative_items.clone(),
            });
        }
        GenerationOutcome {
            artifact,
            origin: ArtifactOrigin::Cache,
            fingerprint,
            attempts: 0,
            transport_attempts: 0,
            backoff_delays: Vec::new(),
        }
    }

    async fn generate_fresh(
        &self,
        request: &GenerationRequest,
        sanitized: &SanitizedText,
        fingerprint: Fingerprint,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, GenerationError> {
        let depth = self.profile.depth();
        let max_attempts = self.profile.max_attempts.max(1);
        let mut state = AttemptState {
            attempt: 0,
            last_candidate: None,
            instructions: PromptInstructions::for_profile(
                self.profile.mode,
                &request.domain_profile,
                &depth,
            ),
        };
        let mut transport = TransportLog::default();

        let subject_id = request.subject_id.clone();
        let notifier = Arc::clone(&self.notifier);
        let on_partial = move |items: Vec<String>| {
            notifier.notify(GenerationEvent::Progress {
                subject_id: subject_id.clone(),
                narrative_items: items,
            });
        };

        loop {
            state.attempt += 1;
            let invocation = self.build_invocation(request, sanitized, &state.instructions);

            let rejection = match self
                .invoke_with_retry(invocation, &on_partial, cancel, &mut transport)
                .await
            {
                Ok(candidate) => match self.gate.evaluate(&candidate) {
                    Verdict::Accept(artifact) => {
                        return self
                            .accept(request, fingerprint, artifact, state.attempt, transport)
                            .await;
                    }
                    Verdict::Reject(rejection) => rejection,
                },
                Err(InvokeFailure::Malformed(reason)) => Rejection {
                    error: ValidationError::shape(reason),
                    candidate: None,
                },
                Err(InvokeFailure::Fatal(error)) => return Err(error),
            };

            warn!(
                attempt = state.attempt,
                max_attempts,
                reason = %rejection.error,
                "Candidate rejected"
            );
            if let Some(candidate) = rejection.candidate {
                state.last_candidate = Some(candidate);
            }

            if state.attempt >= max_attempts {
                return self.exhausted(state, rejection.error, fingerprint, transport);
            }
            state
                .instructions
                .push_note(escalation_note(&rejection.error, &depth));
        }
    }

    fn build_invocation(
        &self,
        request: &GenerationRequest,
        sanitized: &SanitizedText,
        instructions: &PromptInstructions,
    ) -> LlmInvocation {
        LlmInvocation::new(
            request.subject_id.clone(),
            self.profile.request_timeout(),
            vec![
                Message::system(instructions.render()),
                Message::user(sanitized.as_str()),
            ],
            SamplingParameters {
                model: self.profile.model.clone(),
                temperature: self.profile.temperature,
                max_tokens: self.profile.max_tokens,
            },
        )
    }

    /// One quality attempt's backend call, retrying transport failures with backoff.
    ///
    /// The ticket is released as soon as the call returns, before any
    /// backoff sleep or terminal transition.
    async fn invoke_with_retry(
        &self,
        invocation: LlmInvocation,
        on_partial: &PartialNarrativeCallback,
        cancel: &CancellationToken,
        transport: &mut TransportLog,
    ) -> Result<String, InvokeFailure> {
        let mut tries = 0u32;
        loop {
            tries += 1;
            transport.calls += 1;

            let mut ticket = self
                .limiter
                .acquire_cancellable(cancel)
                .await
                .map_err(|_| InvokeFailure::Fatal(GenerationError::Cancelled))?;
            debug!(
                try_number = tries,
                outstanding = self.limiter.outstanding(),
                "Admitted to backend"
            );
            let result = self
                .invoker
                .invoke(
                    invocation.clone(),
                    self.profile.mode,
                    Some(on_partial),
                    cancel,
                )
                .await;
            self.limiter.release(&mut ticket);

            let error = match result {
                Ok(candidate) => return Ok(candidate),
                Err(error) => error,
            };

            match error {
                LlmError::MalformedOutput(reason) => return Err(InvokeFailure::Malformed(reason)),
                LlmError::Cancelled => return Err(InvokeFailure::Fatal(GenerationError::Cancelled)),
                LlmError::Timeout { duration } => {
                    return Err(InvokeFailure::Fatal(GenerationError::Timeout { duration }));
                }
                e if e.is_retryable() && tries < self.backoff.max_tries() => {
                    let delay = self.backoff.delay_for(tries);
                    warn!(
                        try_number = tries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transport failure, backing off"
                    );
                    transport.delays.push(delay);
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return Err(InvokeFailure::Fatal(GenerationError::Cancelled));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                e if e.is_retryable() => {
                    return Err(InvokeFailure::Fatal(GenerationError::TransportExhausted {
                        attempts: tries,
                        last: e,
                    }));
                }
                e => {
                    return Err(InvokeFailure::Fatal(GenerationError::Configuration(
                        e.to_string(),
                    )));
                }
            }
        }
    }

    /// Persist, then cache. A store failure leaves the cache untouched.
    async fn accept(
        &self,
        request: &GenerationRequest,
        fingerprint: Fingerprint,
        artifact: Artifact,
        attempts: u32,
        transport: TransportLog,
    ) -> Result<GenerationOutcome, GenerationError> {
        if let Some(store) = &self.store {
            persist_artifact(store.as_ref(), &request.subject_id, &artifact).await?;
        }

        let artifact = Arc::new(artifact);
        self.cache.put(
            fingerprint.clone(),
            Arc::clone(&artifact),
            self.profile.cache_ttl(),
        );
        debug!(ttl_secs = self.profile.cache_ttl_secs, "Artifact cached");

        Ok(GenerationOutcome {
            artifact,
            origin: ArtifactOrigin::Generated,
            fingerprint,
            attempts,
            transport_attempts: transport.calls,
            backoff_delays: transport.delays,
        })
    }

    fn exhausted(
        &self,
        state: AttemptState,
        last: ValidationError,
        fingerprint: Fingerprint,
        transport: TransportLog,
    ) -> Result<GenerationOutcome, GenerationError> {
        match (self.profile.exhaustion_policy, state.last_candidate) {
            (ExhaustionPolicy::BestEffort, Some(candidate)) => {
                warn!(
                    attempts = state.attempt,
                    "Attempts exhausted, returning last candidate"
                );
                Ok(GenerationOutcome {
                    artifact: Arc::new(candidate),
                    origin: ArtifactOrigin::BestEffort,
                    fingerprint,
                    attempts: state.attempt,
                    transport_attempts: transport.calls,
                    backoff_delays: transport.delays,
                })
            }
            _ => Err(GenerationError::Exhausted {
                attempts: state.attempt,
                last,
            }),
        }
    }
}

/// Builder for [`Orchestrator`]; anything not set gets a private default.
pub struct OrchestratorBuilder {
    backend: Arc<dyn LlmBackend>,
    profile_name: String,
    profile: GenerationProfile,
    limiter: Option<ConcurrencyLimiter>,
    cache: Option<Arc<ResultCache>>,
    store: Option<Arc<dyn ArtifactStore>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    coalesce: bool,
}

impl OrchestratorBuilder {
    fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            profile_name: STREAMING_PROFILE.to_string(),
            profile: GenerationProfile::streaming(),
            limiter: None,
            cache: None,
            store: None,
            notifier: None,
            coalesce: true,
        }
    }

    /// Builder preloaded with a named profile, cache size and coalescing
    /// setting from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownProfile` if the profile does not exist.
    pub fn from_config(
        config: &Config,
        profile: Option<&str>,
        backend: Arc<dyn LlmBackend>,
    ) -> Result<Self, ConfigError> {
        let (name, profile) = config.resolve_profile(profile)?;
        Ok(Self::new(backend)
            .profile(name, profile)
            .cache(Arc::new(ResultCache::new(config.cache.max_entries)))
            .coalesce(config.orchestrator.coalesce_inflight))
    }

    /// The profile name also namespaces fingerprints.
    #[must_use]
    pub fn profile(mut self, name: impl Into<String>, profile: GenerationProfile) -> Self {
        self.profile_name = name.into();
        self.profile = profile;
        self
    }

    /// Override the profile's whole-request deadline (whole seconds, at least one)
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.profile.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Share a limiter; otherwise one is sized from the profile
    #[must_use]
    pub fn limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Coalesce concurrent identical requests (on by default)
    #[must_use]
    pub fn coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let limiter = self
            .limiter
            .unwrap_or_else(|| ConcurrencyLimiter::for_profile(&self.profile));
        Orchestrator {
            fingerprinter: Fingerprinter::new(self.profile_name.clone()),
            gate: QualityGate::new(self.profile.depth()),
            backoff: BackoffPolicy::from(&self.profile.backoff),
            invoker: BackendInvoker::new(self.backend),
            limiter,
            cache: self.cache.unwrap_or_default(),
            store: self.store,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(NullSink)),
            inflight: self.coalesce.then(|| Arc::new(InflightRegistry::new())),
            sanitizer: Sanitizer::new(),
            profile_name: self.profile_name,
            profile: self.profile,
        }
    }
}
