//! OpenAI-compatible chat-completions backend
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol,
//! including self-hosted gateways, so only the base URL and key differ.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http_client::HttpClient;
use crate::sse::consume_event_stream;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, StreamObserver};
use storyflow_config::Config;
use storyflow_utils::error::LlmError;

const PROVIDER: &str = "openai";

/// Model used when neither the invocation nor the configuration names one
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// HTTP backend for OpenAI-compatible endpoints
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: HttpClient,
    endpoint: String,
    api_key: String,
    default_model: String,
}

impl OpenAiBackend {
    /// Create a backend for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        default_model: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::new(connect_timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Create a backend from configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if:
    /// - The API key environment variable is unset or empty
    /// - The HTTP client cannot be constructed
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let backend = &config.backend;
        let api_key = backend.api_key().ok_or_else(|| {
            LlmError::Misconfiguration(format!(
                "API key not found in environment variable '{}'. \
                 Please set this variable or configure a different api_key_env in [backend].",
                backend.api_key_env
            ))
        })?;

        Self::new(
            api_key,
            &backend.base_url,
            backend.model.clone(),
            backend.connect_timeout(),
        )
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, inv: &LlmInvocation, stream: bool) -> (String, reqwest::RequestBuilder) {
        let model = if inv.sampling.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.sampling.model.clone()
        };

        let request = {
            let body = ChatRequest {
                model: &model,
                messages: inv.messages.iter().map(ChatMessage::from).collect(),
                max_tokens: inv.sampling.max_tokens,
                temperature: inv.sampling.temperature,
                stream,
            };
            self.client
                .request(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        };
        (model, request)
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, request) = self.build_request(&inv, false);

        debug!(
            provider = PROVIDER,
            subject_id = %inv.subject_id,
            model = %model,
            max_tokens = inv.sampling.max_tokens,
            temperature = inv.sampling.temperature,
            "Invoking backend"
        );

        let response = self.client.execute(request, inv.timeout, PROVIDER).await?;

        let body: ChatResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse {PROVIDER} response: {e}"))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                LlmError::MalformedOutput(format!("{PROVIDER} response missing choices[0] content"))
            })?;

        let mut result = LlmResult::new(content, PROVIDER, body.model.unwrap_or(model));
        if let Some(usage) = body.usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }

        debug!(
            provider = PROVIDER,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Backend invocation completed"
        );

        Ok(result)
    }

    async fn invoke_stream(
        &self,
        inv: LlmInvocation,
        observer: &dyn StreamObserver,
        cancel: &CancellationToken,
    ) -> Result<LlmResult, LlmError> {
        let (model, request) = self.build_request(&inv, true);

        debug!(
            provider = PROVIDER,
            subject_id = %inv.subject_id,
            model = %model,
            "Opening backend stream"
        );

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            response = self.client.execute(request, inv.timeout, PROVIDER) => response?,
        };

        let text = consume_event_stream(response.bytes_stream(), observer, cancel).await?;

        debug!(provider = PROVIDER, response_len = text.len(), "Backend stream closed");
        Ok(LlmResult::new(text, PROVIDER, model))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for ChatMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SamplingParameters;

    fn backend() -> OpenAiBackend {
        OpenAiBackend::new("test-key", "http://localhost:9/v1/", None, Duration::from_secs(1))
            .unwrap()
    }

    fn invocation(model: &str) -> LlmInvocation {
        LlmInvocation::new(
            "p1",
            Duration::from_secs(5),
            vec![Message::system("rules"), Message::user("text")],
            SamplingParameters {
                model: model.to_string(),
                temperature: 0.2,
                max_tokens: 64,
            },
        )
    }

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        assert_eq!(backend().endpoint(), "http://localhost:9/v1/chat/completions");
    }

    #[test]
    fn test_empty_model_falls_back_to_default() {
        let (model, _) = backend().build_request(&invocation(""), false);
        assert_eq!(model, DEFAULT_MODEL);

        let (model, _) = backend().build_request(&invocation("gpt-4o"), true);
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn test_request_body_shape() {
        let inv = invocation("gpt-4o");
        let body = ChatRequest {
            model: "gpt-4o",
            messages: inv.messages.iter().map(ChatMessage::from).collect(),
            max_tokens: 64,
            temperature: 0.2,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "text");
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_missing_api_key_is_misconfiguration() {
        let mut config = Config::default();
        config.backend.api_key_env = "STORYFLOW_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        let err = OpenAiBackend::new_from_config(&config).unwrap_err();
        match err {
            LlmError::Misconfiguration(msg) => {
                assert!(msg.contains("STORYFLOW_TEST_KEY_THAT_IS_NEVER_SET"));
            }
            other => panic!("expected Misconfiguration, got {other:?}"),
        }
    }
}
