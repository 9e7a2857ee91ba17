//! storyflow - requirement text in, user stories and a process flow out
//!
//! The crate is a facade over the workspace crates plus the `storyflow`
//! CLI. Library users normally need only the re-exports below:
//!
//! ```no_run
//! use std::sync::Arc;
//! use storyflow::{Config, GenerationRequest, Orchestrator};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::default();
//! let backend = storyflow::backend_from_config(&config)?;
//! let orchestrator = Orchestrator::from_config(&config, Some("batch"), backend)?;
//!
//! let request = GenerationRequest::new("claims", "Adjusters review claims...", "insurance");
//! let outcome = orchestrator.generate(&request).await?;
//! println!("{} stories", outcome.artifact.narrative_items.len());
//! # Ok(())
//! # }
//! ```

pub mod cli;

pub use storyflow_config::{CliArgs, Config, GenerationProfile};
pub use storyflow_llm::{
    ConcurrencyLimiter, LlmBackend, LlmError, OpenAiBackend, from_config as backend_from_config,
};
pub use storyflow_orchestrator::{
    ArtifactOrigin, ArtifactStore, ChannelSink, GenerationError, GenerationEvent,
    GenerationOutcome, GenerationRequest, InMemoryArtifactStore, NotificationSink, Orchestrator,
    OrchestratorBuilder,
};
pub use storyflow_redaction::{SanitizedText, Sanitizer, sanitize};
pub use storyflow_utils::cache::ResultCache;
pub use storyflow_utils::exit_codes::ExitCode;
pub use storyflow_utils::logging::init_tracing;
pub use storyflow_utils::types::{Artifact, Edge, Node, NodeKind, ProcessGraph};
pub use storyflow_validation::{QualityGate, Verdict};
