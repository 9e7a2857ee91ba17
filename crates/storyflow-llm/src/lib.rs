//! LLM backend abstraction for storyflow
//!
//! The orchestrator only sees the `LlmBackend` trait. This crate provides the
//! OpenAI-compatible HTTP implementation, the SSE decoder used for streamed
//! responses, candidate extraction, and the admission limiter that sits in
//! front of every upstream call.

pub mod extraction;
pub(crate) mod http_client;
mod invoker;
mod limiter;
mod openai_backend;
pub mod sse;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

use std::sync::Arc;

pub use http_client::redact_error_message;
pub use invoker::{BackendInvoker, PartialNarrativeCallback};
pub use limiter::{AdmissionTicket, ConcurrencyLimiter};
pub use openai_backend::OpenAiBackend;
pub use storyflow_utils::error::LlmError;
pub use types::{
    IgnoreFragments, LlmBackend, LlmInvocation, LlmResult, Message, Role, SamplingParameters,
    StreamObserver,
};

use storyflow_config::Config;

/// Construct the configured backend.
///
/// # Errors
///
/// Returns `LlmError::Misconfiguration` if the API key is missing or the HTTP
/// client cannot be built. This is fatal and never retried.
pub fn from_config(config: &Config) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let backend = OpenAiBackend::new_from_config(config)?;
    tracing::debug!(endpoint = backend.endpoint(), "Constructed backend");
    Ok(Arc::new(backend))
}
