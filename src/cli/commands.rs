//! CLI command implementations
//!
//! Each `execute_*` function handles one subcommand. They write to the
//! writers they are given so tests can capture output.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use storyflow_config::Config;
use storyflow_llm::LlmBackend;
use storyflow_orchestrator::{
    GenerationError, GenerationOutcome, GenerationRequest, NotificationSink, OrchestratorBuilder,
};
use storyflow_redaction::Sanitizer;
use storyflow_utils::error::UserFriendlyError;

/// Options for `storyflow generate` that are not configuration
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub subject: String,
    pub domain: String,
    /// Overrides the profile's request timeout
    pub timeout: Option<Duration>,
}

// ============================================================================
// Generate Command
// ============================================================================

/// Run one generation with the configured default profile.
///
/// # Errors
///
/// Any terminal [`GenerationError`]. An unknown profile is reported as
/// `GenerationError::Configuration`.
pub async fn execute_generate_command(
    config: &Config,
    backend: Arc<dyn LlmBackend>,
    options: &GenerateOptions,
    raw_text: String,
    notifier: Arc<dyn NotificationSink>,
    cancel: &CancellationToken,
) -> Result<GenerationOutcome, GenerationError> {
    let mut builder = OrchestratorBuilder::from_config(config, None, backend)
        .map_err(|e| GenerationError::Configuration(e.user_message()))?
        .notifier(notifier);
    if let Some(timeout) = options.timeout {
        builder = builder.request_timeout(timeout);
    }
    let orchestrator = builder.build();

    tracing::debug!(
        profile = orchestrator.profile_name(),
        mode = %orchestrator.profile().mode,
        model = %orchestrator.profile().model,
        "Starting generation"
    );

    let request = GenerationRequest::new(&options.subject, raw_text, &options.domain);
    orchestrator.generate_with_cancel(&request, cancel).await
}

/// JSON document printed on stdout for a successful generation
#[must_use]
pub fn render_outcome(outcome: &GenerationOutcome, artifact_only: bool) -> Value {
    let artifact = json!(outcome.artifact.as_ref());
    if artifact_only {
        return artifact;
    }
    json!({
        "origin": outcome.origin,
        "fingerprint": outcome.fingerprint,
        "attempts": outcome.attempts,
        "transport_attempts": outcome.transport_attempts,
        "backoff_ms": outcome
            .backoff_delays
            .iter()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .collect::<Vec<_>>(),
        "artifact": artifact,
    })
}

// ============================================================================
// Sanitize Command
// ============================================================================

/// Write the sanitized form of `input`; with `report`, per-pattern counts go to `diag`.
///
/// # Errors
///
/// Fails only if a writer fails.
pub fn execute_sanitize_command(
    input: &str,
    report: bool,
    out: &mut dyn Write,
    diag: &mut dyn Write,
) -> Result<()> {
    let result = Sanitizer::new().sanitize_with_report(input);
    out.write_all(result.text.as_str().as_bytes())
        .context("Failed to write sanitized text")?;
    out.flush()?;

    if report {
        for redaction in &result.redactions {
            writeln!(diag, "{}: {}", redaction.pattern_id, redaction.count)?;
        }
        writeln!(diag, "total: {}", result.total())?;
    }
    Ok(())
}

// ============================================================================
// Config Command
// ============================================================================

/// Print the effective configuration with the source of each value.
///
/// # Errors
///
/// Fails only if the writer fails or JSON serialization fails.
pub fn execute_config_command(config: &Config, json: bool, out: &mut dyn Write) -> Result<()> {
    let effective = config.effective_config();

    if json {
        let map: serde_json::Map<String, Value> = effective
            .into_iter()
            .map(|(key, (value, source))| (key, json!({"value": value, "source": source})))
            .collect();
        let rendered = serde_json::to_string_pretty(&Value::Object(map))
            .context("Failed to serialize configuration")?;
        writeln!(out, "{rendered}")?;
        return Ok(());
    }

    writeln!(out, "Effective configuration:")?;
    let width = effective.keys().map(String::len).max().unwrap_or(0);
    for (key, (value, source)) in &effective {
        writeln!(out, "  {key:<width$} = {value}  [{source}]")?;
    }
    writeln!(out)?;
    writeln!(out, "Profiles: {}", config.profile_names().join(", "))?;
    writeln!(
        out,
        "API key: {} ({})",
        config.backend.api_key_env,
        if config.backend.api_key().is_some() {
            "set"
        } else {
            "not set"
        }
    )?;
    Ok(())
}
