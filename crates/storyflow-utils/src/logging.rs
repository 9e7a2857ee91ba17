//! Structured logging setup
//!
//! Library crates only emit `tracing` events; the binary installs the
//! subscriber once through [`init_tracing`].

use tracing::Span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "storyflow=info,warn";

/// Filter used with `--verbose` when `RUST_LOG` is unset
pub const VERBOSE_FILTER: &str = "storyflow=debug,info";

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` always wins. Verbose mode adds targets and span close events
/// (with their busy/idle timings) to the compact format.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Filter directive for the given verbosity
#[must_use]
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }
}

/// Span covering one generation request.
///
/// `fingerprint` is recorded later, once the sanitized input has been hashed.
#[must_use]
pub fn generation_span(subject_id: &str, profile: &str) -> Span {
    tracing::info_span!(
        "generation",
        subject_id = %subject_id,
        profile = %profile,
        fingerprint = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_parse() {
        assert!(EnvFilter::try_new(default_filter(false)).is_ok());
        assert!(EnvFilter::try_new(default_filter(true)).is_ok());
        assert_eq!(default_filter(true), "storyflow=debug,info");
    }

    #[test]
    fn test_generation_span_can_be_entered() {
        let span = generation_span("p1", "streaming");
        let _guard = span.enter();
        span.record("fingerprint", "abc123");
    }
}
