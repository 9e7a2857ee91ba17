//! Generation orchestrator for storyflow
//!
//! Owns the per-request pipeline: sanitize and fingerprint the input, serve
//! from the cache when possible, otherwise admit the call through the
//! limiter, invoke the backend with transport retries, run the quality gate
//! and escalate the instructions until a candidate passes or attempts run
//! out. Accepted artifacts are persisted, then cached.

mod inflight;
mod orchestrator;
mod outcome;
mod prompts;
mod retry;
mod sinks;

pub use inflight::{Claim, InflightRegistry, LeaderGuard, Waiter};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use outcome::{ArtifactOrigin, GenerationOutcome};
pub use prompts::{DEFAULT_DOMAIN, PromptInstructions, escalation_note};
pub use retry::BackoffPolicy;
pub use sinks::{
    ArtifactStore, ChannelSink, GenerationEvent, InMemoryArtifactStore, NotificationSink,
    NullSink, StoredArtifacts, persist_artifact,
};
pub use storyflow_utils::error::GenerationError;
pub use storyflow_utils::types::GenerationRequest;
