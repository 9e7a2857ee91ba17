use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use storyflow_utils::fingerprint::Fingerprint;
use storyflow_utils::types::Artifact;

/// Where the returned artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Served from the result cache without calling the backend
    Cache,
    /// Generated and accepted by the quality gate
    Generated,
    /// Attempts ran out and the last rejected candidate was returned anyway.
    /// Never cached or persisted.
    BestEffort,
}

impl ArtifactOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Generated => "generated",
            Self::BestEffort => "best_effort",
        }
    }
}

impl fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report for one successful `generate` call
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: Arc<Artifact>,
    pub origin: ArtifactOrigin,
    pub fingerprint: Fingerprint,
    /// Quality attempts made (zero for cache hits)
    pub attempts: u32,
    /// Backend calls made across all quality attempts
    pub transport_attempts: u32,
    /// Backoff delays actually slept between transport retries, in order
    pub backoff_delays: Vec<Duration>,
}

impl GenerationOutcome {
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.origin == ArtifactOrigin::Cache
    }
}
