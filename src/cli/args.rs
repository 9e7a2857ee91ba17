//! CLI argument definitions and parsing structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// storyflow - requirement text in, user stories and a process flow out
#[derive(Parser, Debug)]
#[command(name = "storyflow")]
#[command(about = "Turn requirement text into validated user stories and a process flow")]
#[command(long_about = r#"
storyflow sends sanitized requirement text to an OpenAI-compatible backend,
checks the returned stories and process flow against the selected profile's
depth thresholds, and asks again with corrective notes until a candidate
passes or the attempt budget runs out.

EXAMPLES:
  # Generate from a file with the default (streaming) profile
  storyflow generate --subject onboarding --input requirements.txt

  # Generate from stdin with the richer batch profile
  cat notes.txt | storyflow generate --subject claims --profile batch --domain insurance

  # Show what the sanitizer would send upstream
  echo "Call me at +1 555 123 4567" | storyflow sanitize

  # Print the effective configuration and where each value came from
  storyflow config

CONFIGURATION:
  Precedence: CLI flags > config file > defaults
  The config file is $STORYFLOW_HOME/config.toml, or .storyflow/config.toml
  found by searching upward from the current directory. Use --config to
  point at a specific file. The API key is read from the environment
  variable named by [backend] api_key_env (default OPENAI_API_KEY).
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Model to use for every profile
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Backend base URL (OpenAI-compatible, e.g. https://api.openai.com/v1)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate stories and a process flow for one subject
    Generate {
        /// Subject (project) the requirement text belongs to
        #[arg(long)]
        subject: String,

        /// Read requirement text from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,

        /// Domain label used in the analyst persona and the cache key
        #[arg(long, default_value = "generic")]
        domain: String,

        /// Generation profile (default from [orchestrator] default_profile)
        #[arg(long)]
        profile: Option<String>,

        /// Override the profile's request timeout, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not coalesce identical in-flight requests
        #[arg(long)]
        no_coalesce: bool,

        /// Print only the artifact, without the outcome report
        #[arg(long)]
        artifact_only: bool,
    },

    /// Print stdin with emails and phone numbers redacted
    Sanitize {
        /// Also report how many of each pattern were replaced (to stderr)
        #[arg(long)]
        report: bool,
    },

    /// Print the effective configuration with value sources
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
