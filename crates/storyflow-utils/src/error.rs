use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Trait for errors that can be shown to an end user with context and advice.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Backend,
    ResourceLimits,
    Validation,
    Cancellation,
    Persistence,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Backend => write!(f, "LLM Backend"),
            Self::ResourceLimits => write!(f, "Resource Limits"),
            Self::Validation => write!(f, "Validation"),
            Self::Cancellation => write!(f, "Cancellation"),
            Self::Persistence => write!(f, "Persistence"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Unknown generation profile '{0}'")]
    UnknownProfile(String),
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(msg) => format!("Configuration file is invalid: {msg}"),
            Self::MissingRequired(what) => format!("Required setting is missing: {what}"),
            Self::InvalidValue { key, value } => {
                format!("Invalid value '{value}' for configuration key '{key}'")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Could not locate configuration: {reason}")
            }
            Self::UnknownProfile(name) => format!("No generation profile named '{name}'"),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Configuration is read from .storyflow/config.toml, STORYFLOW_HOME, or --config."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::UnknownProfile(_) => vec![
                "Use one of the built-in profiles: 'streaming' or 'batch'".to_string(),
                "Define the profile under [profiles.<name>] in config.toml".to_string(),
            ],
            Self::InvalidFile(_) => vec!["Check the TOML syntax of the configuration file".to_string()],
            _ => vec![
                "Run 'storyflow config' to see the effective configuration".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors that can occur during LLM backend operations
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Network-level failure (connect, read, body decode)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status that has no more specific classification
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Provider authentication failure (401, 403)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// The backend answered but no structured document could be located
    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    /// The call was aborted by its cancellation token
    #[error("Invocation cancelled")]
    Cancelled,

    /// Missing credential or invalid backend settings
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

impl LlmError {
    /// Whether a transport retry may succeed where this attempt failed.
    ///
    /// Network faults, 5xx, 429 and other non-auth statuses are retryable.
    /// Authentication, misconfiguration, cancellation, timeouts and malformed
    /// output are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::ProviderQuota(_) | Self::ProviderOutage(_)
        )
    }

    /// Whether this error can only be fixed by changing configuration
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ProviderAuth(_) | Self::Misconfiguration(_))
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::Status { status, message } => {
                format!("LLM backend returned HTTP {status}: {message}")
            }
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => format!("LLM invocation timed out after {duration:?}"),
            Self::MalformedOutput(msg) => format!("LLM output could not be parsed: {msg}"),
            Self::Cancelled => "LLM invocation was cancelled".to_string(),
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) | Self::Status { .. } => Some(
                "Transport errors occur when the LLM backend cannot be reached or answers with an error status."
                    .to_string(),
            ),
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::ProviderOutage(_) => {
                Some("Provider outages are temporary service disruptions.".to_string())
            }
            Self::Timeout { .. } => Some(
                "Timeouts occur when a generation takes longer than the profile allows."
                    .to_string(),
            ),
            Self::MalformedOutput(_) => {
                Some("The model did not return a JSON document.".to_string())
            }
            Self::Cancelled => None,
            Self::Misconfiguration(_) => Some(
                "Configuration errors indicate missing or invalid backend settings.".to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) | Self::Status { .. } => vec![
                "Verify network connectivity and the configured base_url".to_string(),
                "Try running with --verbose to see detailed error information".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable is set (default OPENAI_API_KEY)"
                    .to_string(),
                "Verify the API key is valid and not expired".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) => vec![
                "Wait a few minutes and try again".to_string(),
                "Lower the profile's concurrency or rate_limit settings".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase request_timeout_secs for the profile or pass --timeout".to_string(),
            ],
            Self::MalformedOutput(_) => vec![
                "Try again; malformed output is usually transient".to_string(),
            ],
            Self::Cancelled => vec![],
            Self::Misconfiguration(_) => vec![
                "Check the [backend] section in .storyflow/config.toml".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Status { .. } | Self::ProviderOutage(_) => {
                ErrorCategory::Backend
            }
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => ErrorCategory::Configuration,
            Self::ProviderQuota(_) | Self::Timeout { .. } => ErrorCategory::ResourceLimits,
            Self::MalformedOutput(_) => ErrorCategory::Validation,
            Self::Cancelled => ErrorCategory::Cancellation,
        }
    }
}

/// Why the quality gate rejected a candidate.
///
/// Rejection is an expected outcome that drives prompt escalation, not a
/// failure of the gate itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Candidate is unparseable or referentially inconsistent
    #[error("shape: {reason}")]
    Shape { reason: String },

    /// Candidate is well formed but too shallow
    #[error("depth: {}", shortfalls.join("; "))]
    Depth { shortfalls: Vec<String> },
}

impl ValidationError {
    #[must_use]
    pub fn shape(reason: impl Into<String>) -> Self {
        Self::Shape {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }

    #[must_use]
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth { .. })
    }
}

/// Errors raised by the artifact persistence collaborator
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("artifact store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to save {kind} for subject {subject_id}: {reason}")]
    WriteFailed {
        subject_id: String,
        kind: String,
        reason: String,
    },
}

/// Terminal error of one generation request.
///
/// Transport and quality failures are recovered internally; a caller only
/// sees one of these once retries are exhausted or the request is aborted.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Missing credential or invalid settings. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport retries exhausted after {attempts} attempt(s): {last}")]
    TransportExhausted { attempts: u32, last: LlmError },

    #[error("Quality attempts exhausted after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: ValidationError },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Generation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Failed to persist accepted artifact: {0}")]
    Persistence(#[from] StoreError),
}

impl GenerationError {
    /// Map this error to the CLI exit code.
    ///
    /// | Exit Code | Error |
    /// |-----------|-------|
    /// | 2 | Configuration |
    /// | 3 | Quality attempts exhausted |
    /// | 10 | Timeout |
    /// | 70 | Transport retries exhausted |
    /// | 74 | Persistence |
    /// | 130 | Cancelled |
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Configuration(_) => ExitCode::CONFIGURATION,
            Self::TransportExhausted { .. } => ExitCode::BACKEND_FAILURE,
            Self::Exhausted { .. } => ExitCode::QUALITY_EXHAUSTED,
            Self::Cancelled => ExitCode::CANCELLED,
            Self::Timeout { .. } => ExitCode::TIMEOUT,
            Self::Persistence(_) => ExitCode::PERSISTENCE,
        }
    }

    /// User-facing rendering with context and suggestions.
    ///
    /// The result is passed through the PII sanitizer before it is returned.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        storyflow_redaction::sanitize(&output).into_string()
    }
}

impl UserFriendlyError for GenerationError {
    fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) => format!("Generation is misconfigured: {msg}"),
            Self::TransportExhausted { attempts, last } => format!(
                "The LLM backend failed {attempts} time(s) in a row: {}",
                last.user_message()
            ),
            Self::Exhausted { attempts, last } => format!(
                "No acceptable result after {attempts} attempt(s); last rejection was {last}"
            ),
            Self::Cancelled => "Generation was cancelled".to_string(),
            Self::Timeout { duration } => format!("Generation timed out after {duration:?}"),
            Self::Persistence(err) => format!("The result could not be saved: {err}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::TransportExhausted { last, .. } => last.context(),
            Self::Exhausted { .. } => Some(
                "Every candidate was rejected by the quality gate for shape or depth.".to_string(),
            ),
            Self::Timeout { .. } => Some(
                "The absolute request deadline covers admission, every attempt and backoff."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Configuration(_) => vec![
                "Check that the API key environment variable is set".to_string(),
                "Run 'storyflow config' to inspect the effective settings".to_string(),
            ],
            Self::TransportExhausted { last, .. } => last.suggestions(),
            Self::Exhausted { .. } => vec![
                "Provide more detailed requirement text".to_string(),
                "Use a profile with exhaustion_policy = \"best_effort\"".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase the timeout with --timeout or request_timeout_secs".to_string(),
            ],
            Self::Cancelled | Self::Persistence(_) => vec![],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::TransportExhausted { last, .. } => last.category(),
            Self::Exhausted { .. } => ErrorCategory::Validation,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Timeout { .. } => ErrorCategory::ResourceLimits,
            Self::Persistence(_) => ErrorCategory::Persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Transport("reset".into()).is_retryable());
        assert!(
            LlmError::Status {
                status: 404,
                message: "nope".into()
            }
            .is_retryable()
        );
        assert!(LlmError::ProviderQuota("429".into()).is_retryable());
        assert!(LlmError::ProviderOutage("503".into()).is_retryable());

        assert!(!LlmError::ProviderAuth("401".into()).is_retryable());
        assert!(!LlmError::Misconfiguration("no key".into()).is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
        assert!(
            !LlmError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(!LlmError::MalformedOutput("no braces".into()).is_retryable());
    }

    #[test]
    fn test_depth_error_lists_every_shortfall() {
        let err = ValidationError::Depth {
            shortfalls: vec!["nodes 5 < 8".into(), "decisions 0 < 2".into()],
        };
        assert_eq!(err.to_string(), "depth: nodes 5 < 8; decisions 0 < 2");
        assert!(err.is_depth());
        assert!(!err.is_shape());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            GenerationError::Configuration("x".into()).to_exit_code(),
            ExitCode::CONFIGURATION
        );
        assert_eq!(
            GenerationError::Cancelled.to_exit_code().as_i32(),
            130
        );
        assert_eq!(
            GenerationError::Exhausted {
                attempts: 2,
                last: ValidationError::shape("bad json")
            }
            .to_exit_code(),
            ExitCode::QUALITY_EXHAUSTED
        );
    }

    #[test]
    fn test_display_for_user_is_sanitized() {
        let err = GenerationError::Configuration("contact admin@example.com".into());
        let rendered = err.display_for_user();
        assert!(rendered.starts_with("Error: "));
        assert!(rendered.contains("Suggestions:"));
        assert!(!rendered.contains("admin@example.com"));
    }

    #[test]
    fn test_transport_exhausted_delegates_category() {
        let err = GenerationError::TransportExhausted {
            attempts: 3,
            last: LlmError::ProviderQuota("slow down".into()),
        };
        assert_eq!(err.category(), ErrorCategory::ResourceLimits);
        assert!(err.to_string().contains("3 attempt(s)"));
    }
}
