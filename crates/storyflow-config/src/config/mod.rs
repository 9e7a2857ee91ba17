//! Configuration management for storyflow
//!
//! Hierarchical configuration with discovery and precedence: CLI > file >
//! defaults. The TOML file carries `[backend]`, `[cache]`, `[orchestrator]`
//! and `[profiles.<name>]` sections.

mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use cli_args::CliArgs;
pub use model::*;
pub use storyflow_utils::types::ConfigSource;

use std::collections::{BTreeMap, HashMap};

use storyflow_utils::error::ConfigError;

impl Default for Config {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(STREAMING_PROFILE.to_string(), GenerationProfile::streaming());
        profiles.insert(BATCH_PROFILE.to_string(), GenerationProfile::batch());

        Self {
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            profiles,
            source_attribution: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProfile`] if no profile has that name.
    pub fn profile(&self, name: &str) -> Result<&GenerationProfile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// Resolve the profile to run with, applying the backend model override.
    ///
    /// `None` selects `[orchestrator] default_profile`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProfile`] if the name does not resolve.
    pub fn resolve_profile(
        &self,
        name: Option<&str>,
    ) -> Result<(String, GenerationProfile), ConfigError> {
        let name = name.unwrap_or(&self.orchestrator.default_profile);
        let mut profile = self.profile(name)?.clone();
        if let Some(model) = &self.backend.model {
            profile.model = model.clone();
        }
        Ok((name.to_string(), profile))
    }

    /// Names of all configured profiles, sorted
    #[must_use]
    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}
