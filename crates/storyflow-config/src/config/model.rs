use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use storyflow_utils::types::{ConfigSource, DepthRequirements, ExhaustionPolicy, InvocationMode};

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the API key unless `[backend] api_key_env` says otherwise
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default TCP connect timeout for the backend client
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Name of the lighter built-in profile
pub const STREAMING_PROFILE: &str = "streaming";

/// Name of the richer built-in profile
pub const BATCH_PROFILE: &str = "batch";

/// Configuration for storyflow.
///
/// Precedence: CLI arguments > config file > built-in defaults. Each value
/// that can be overridden records where it came from in `source_attribution`.
///
/// # Configuration File Format
///
/// ```toml
/// [backend]
/// base_url = "https://api.openai.com/v1"
/// api_key_env = "OPENAI_API_KEY"
/// model = "gpt-4o-mini"
///
/// [cache]
/// max_entries = 512
///
/// [orchestrator]
/// coalesce_inflight = true
/// default_profile = "streaming"
///
/// [profiles.batch]
/// max_attempts = 4
/// exhaustion_policy = "fail"
///
/// [profiles.strict]
/// extends = "batch"
/// min_nodes = 14
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    /// Named generation profiles, always including `streaming` and `batch`
    pub profiles: BTreeMap<String, GenerationProfile>,
    /// Source attribution for each setting (for `storyflow config`).
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Upstream backend connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Overrides every profile's model when set
    pub model: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            model: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// Empty values count as missing.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: storyflow_utils::cache::DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Collapse concurrent requests with the same fingerprint into one upstream call
    pub coalesce_inflight: bool,
    pub default_profile: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            coalesce_inflight: true,
            default_profile: STREAMING_PROFILE.to_string(),
        }
    }
}

/// Rolling-window call ceiling: at most `max_calls` admissions per `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl RateLimit {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Exponential backoff between transport retries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
    /// Total transport tries per quality attempt, including the first
    pub max_tries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 500,
            factor: 2.0,
            max_ms: 2000,
            max_tries: 3,
        }
    }
}

/// One named generation profile.
///
/// Bundles everything that differs between the lighter interactive flow and the
/// richer batch flow: prompt sampling, depth thresholds, retry budgets, cache
/// lifetime and upstream throttling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationProfile {
    pub mode: InvocationMode,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub min_nodes: usize,
    pub min_edges: usize,
    pub min_decisions: usize,
    pub require_loop: bool,
    pub require_error_path: bool,
    /// Quality attempts, including the first
    pub max_attempts: u32,
    pub exhaustion_policy: ExhaustionPolicy,
    pub cache_ttl_secs: u64,
    /// Concurrency ceiling C for upstream calls
    pub concurrency: usize,
    pub rate_limit: Option<RateLimit>,
    /// Absolute deadline for one request
    pub request_timeout_secs: u64,
    pub backoff: BackoffConfig,
}

impl GenerationProfile {
    /// Lighter interactive profile: streamed, fail-fast on exhaustion.
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            mode: InvocationMode::Streaming,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 700,
            min_nodes: 8,
            min_edges: 7,
            min_decisions: 2,
            require_loop: false,
            require_error_path: false,
            max_attempts: 2,
            exhaustion_policy: ExhaustionPolicy::Fail,
            cache_ttl_secs: 24 * 60 * 60,
            concurrency: 4,
            rate_limit: None,
            request_timeout_secs: 120,
            backoff: BackoffConfig::default(),
        }
    }

    /// Richer batch profile: unary, loop and error path required, best-effort on exhaustion.
    #[must_use]
    pub fn batch() -> Self {
        Self {
            mode: InvocationMode::Unary,
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 3000,
            min_nodes: 10,
            min_edges: 9,
            min_decisions: 3,
            require_loop: true,
            require_error_path: true,
            max_attempts: 3,
            exhaustion_policy: ExhaustionPolicy::BestEffort,
            cache_ttl_secs: 60 * 60,
            concurrency: 3,
            rate_limit: Some(RateLimit {
                max_calls: 50,
                window_secs: 60,
            }),
            request_timeout_secs: 300,
            backoff: BackoffConfig::default(),
        }
    }

    /// Depth thresholds for the quality gate
    #[must_use]
    pub fn depth(&self) -> DepthRequirements {
        DepthRequirements {
            min_nodes: self.min_nodes,
            min_edges: self.min_edges,
            min_decisions: self.min_decisions,
            require_loop: self.require_loop,
            require_error_path: self.require_error_path,
        }
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply every field set in `overrides`.
    pub(crate) fn apply(&mut self, overrides: &ProfileOverrides) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(value) = overrides.$field.clone() {
                    self.$field = value;
                })*
            };
        }
        take!(
            mode,
            model,
            temperature,
            max_tokens,
            min_nodes,
            min_edges,
            min_decisions,
            require_loop,
            require_error_path,
            max_attempts,
            exhaustion_policy,
            cache_ttl_secs,
            concurrency,
            request_timeout_secs
        );
        if let Some(rate_limit) = overrides.rate_limit {
            self.rate_limit = Some(rate_limit);
        }
        if let Some(backoff) = &overrides.backoff {
            backoff.apply(&mut self.backoff);
        }
    }
}

/// `[profiles.<name>]` table: any subset of [`GenerationProfile`] fields.
///
/// A new profile starts from the profile named in `extends` (default
/// `streaming`); a built-in profile name overrides that profile in place.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    pub extends: Option<String>,
    pub mode: Option<InvocationMode>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub min_nodes: Option<usize>,
    pub min_edges: Option<usize>,
    pub min_decisions: Option<usize>,
    pub require_loop: Option<bool>,
    pub require_error_path: Option<bool>,
    pub max_attempts: Option<u32>,
    pub exhaustion_policy: Option<ExhaustionPolicy>,
    pub cache_ttl_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub rate_limit: Option<RateLimit>,
    pub request_timeout_secs: Option<u64>,
    pub backoff: Option<BackoffOverrides>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffOverrides {
    pub base_ms: Option<u64>,
    pub factor: Option<f64>,
    pub max_ms: Option<u64>,
    pub max_tries: Option<u32>,
}

impl BackoffOverrides {
    fn apply(&self, backoff: &mut BackoffConfig) {
        if let Some(base_ms) = self.base_ms {
            backoff.base_ms = base_ms;
        }
        if let Some(factor) = self.factor {
            backoff.factor = factor;
        }
        if let Some(max_ms) = self.max_ms {
            backoff.max_ms = max_ms;
        }
        if let Some(max_tries) = self.max_tries {
            backoff.max_tries = max_tries;
        }
    }
}
