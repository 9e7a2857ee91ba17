//! Core types for LLM backend abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use storyflow_utils::error::LlmError;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Sampling parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParameters {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Input to an LLM backend invocation
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// Subject the call is made for, for log correlation only
    pub subject_id: String,
    /// Upper bound for this single call
    pub timeout: Duration,
    /// Ordered list of messages in the conversation
    pub messages: Vec<Message>,
    pub sampling: SamplingParameters,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        timeout: Duration,
        messages: Vec<Message>,
        sampling: SamplingParameters,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            timeout,
            messages,
            sampling,
        }
    }

    /// Content of the system message, if any
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Every message rendered as one block, in order
    #[must_use]
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("[{}]\n{}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result from an LLM backend invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    /// Full response text (the accumulated buffer for streamed calls)
    pub raw_response: String,
    /// Provider name (e.g., "openai")
    pub provider: String,
    /// Model that was actually used
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }
}

/// Receives text fragments as a streamed response arrives.
pub trait StreamObserver: Send + Sync {
    fn on_fragment(&self, fragment: &str);
}

/// Observer that discards every fragment
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreFragments;

impl StreamObserver for IgnoreFragments {
    fn on_fragment(&self, _fragment: &str) {}
}

/// Trait for LLM backend implementations
///
/// The orchestrator only talks to this trait, so tests can substitute a
/// scripted backend for the HTTP one.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Invoke the LLM and wait for the complete response
    ///
    /// # Errors
    ///
    /// Returns `LlmError` for any failure during invocation, including
    /// transport failures, provider errors (auth, quota, outages) and timeouts.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;

    /// Invoke the LLM as an incremental stream.
    ///
    /// Every decoded text fragment is passed to `observer` as it arrives; the
    /// returned result carries the whole accumulated text. When `cancel` fires
    /// the read stops, the connection is dropped and `LlmError::Cancelled` is
    /// returned.
    ///
    /// Backends without native streaming fall back to one unary call whose
    /// body is delivered as a single fragment.
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke), plus `LlmError::Cancelled`.
    async fn invoke_stream(
        &self,
        inv: LlmInvocation,
        observer: &dyn StreamObserver,
        cancel: &CancellationToken,
    ) -> Result<LlmResult, LlmError> {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = self.invoke(inv) => result?,
        };
        observer.on_fragment(&result.raw_response);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling() -> SamplingParameters {
        SamplingParameters {
            model: "m".into(),
            temperature: 0.1,
            max_tokens: 10,
        }
    }

    #[test]
    fn test_prompt_text_keeps_order_and_roles() {
        let inv = LlmInvocation::new(
            "p1",
            Duration::from_secs(5),
            vec![Message::system("rules"), Message::user("input")],
            sampling(),
        );
        assert_eq!(inv.instructions(), Some("rules"));
        assert_eq!(inv.prompt_text(), "[system]\nrules\n\n[user]\ninput");
    }

    #[test]
    fn test_result_builder() {
        let result = LlmResult::new("{}", "openai", "gpt-4o").with_tokens(12, 34);
        assert_eq!(result.tokens_input, Some(12));
        assert_eq!(result.tokens_output, Some(34));
    }
}
