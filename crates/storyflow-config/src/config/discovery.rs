use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use storyflow_utils::error::ConfigError;

use super::{CliArgs, Config, ConfigSource, ProfileOverrides, STREAMING_PROFILE};

/// Environment variable naming a directory that holds `config.toml`
pub const STORYFLOW_HOME_ENV: &str = "STORYFLOW_HOME";

const CONFIG_DIR: &str = ".storyflow";
const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    backend: Option<TomlBackend>,
    cache: Option<TomlCache>,
    orchestrator: Option<TomlOrchestrator>,
    #[serde(default)]
    profiles: BTreeMap<String, ProfileOverrides>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlBackend {
    base_url: Option<String>,
    api_key_env: Option<String>,
    model: Option<String>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlCache {
    max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlOrchestrator {
    coalesce_inflight: Option<bool>,
    default_profile: Option<String>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Looks for the config file in this order: `--config`, then
    /// `$STORYFLOW_HOME/config.toml`, then `.storyflow/config.toml` searched
    /// upward from the current directory.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        let home = env::var_os(STORYFLOW_HOME_ENV).map(PathBuf::from);
        Self::discover_with_home(&start_dir, home.as_deref(), cli_args)
    }

    /// Discover configuration starting from a specific directory, ignoring
    /// `STORYFLOW_HOME`.
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        Self::discover_with_home(start_dir, None, cli_args)
    }

    /// Discover configuration with an explicit home directory.
    pub fn discover_with_home(
        start_dir: &Path,
        home: Option<&Path>,
        cli_args: &CliArgs,
    ) -> Result<Self> {
        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => match home.map(|h| h.join(CONFIG_FILE)).filter(|p| p.exists()) {
                Some(home_config) => Some(home_config),
                None => Self::discover_config_file_from(start_dir)?,
            },
        };

        let mut config = Config::default();
        for key in Self::attributed_keys(&config) {
            config.source_attribution.insert(key, ConfigSource::Default);
        }

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "loading config file");
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            config.apply_file(file_config)?;
        }

        config.apply_cli(cli_args);
        config.validate()?;

        Ok(config)
    }

    fn attributed_keys(config: &Config) -> Vec<String> {
        let mut keys: Vec<String> = [
            "backend.base_url",
            "backend.api_key_env",
            "backend.connect_timeout_secs",
            "cache.max_entries",
            "orchestrator.coalesce_inflight",
            "orchestrator.default_profile",
        ]
        .iter()
        .map(|k| (*k).to_string())
        .collect();
        keys.extend(config.profiles.keys().map(|name| format!("profiles.{name}")));
        keys
    }

    fn apply_file(&mut self, file: TomlConfig) -> Result<(), ConfigError> {
        let source = ConfigSource::Config;

        if let Some(backend) = file.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
                self.source_attribution
                    .insert("backend.base_url".to_string(), source);
            }
            if let Some(api_key_env) = backend.api_key_env {
                self.backend.api_key_env = api_key_env;
                self.source_attribution
                    .insert("backend.api_key_env".to_string(), source);
            }
            if let Some(model) = backend.model {
                self.backend.model = Some(model);
                self.source_attribution
                    .insert("backend.model".to_string(), source);
            }
            if let Some(secs) = backend.connect_timeout_secs {
                self.backend.connect_timeout_secs = secs;
                self.source_attribution
                    .insert("backend.connect_timeout_secs".to_string(), source);
            }
        }

        if let Some(cache) = file.cache
            && let Some(max_entries) = cache.max_entries
        {
            self.cache.max_entries = max_entries;
            self.source_attribution
                .insert("cache.max_entries".to_string(), source);
        }

        if let Some(orchestrator) = file.orchestrator {
            if let Some(coalesce) = orchestrator.coalesce_inflight {
                self.orchestrator.coalesce_inflight = coalesce;
                self.source_attribution
                    .insert("orchestrator.coalesce_inflight".to_string(), source);
            }
            if let Some(default_profile) = orchestrator.default_profile {
                self.orchestrator.default_profile = default_profile;
                self.source_attribution
                    .insert("orchestrator.default_profile".to_string(), source);
            }
        }

        // Built-in names are patched in place. New names start from their
        // `extends` base, which may itself be defined in the same file.
        let mut pending: Vec<(String, ProfileOverrides)> = file.profiles.into_iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for (name, overrides) in pending {
                let base = match self.profiles.get(&name) {
                    Some(existing) => Some(existing.clone()),
                    None => self
                        .profiles
                        .get(overrides.extends.as_deref().unwrap_or(STREAMING_PROFILE))
                        .cloned(),
                };
                match base {
                    Some(mut profile) => {
                        profile.apply(&overrides);
                        self.profiles.insert(name.clone(), profile);
                        self.source_attribution
                            .insert(format!("profiles.{name}"), source);
                    }
                    None => deferred.push((name, overrides)),
                }
            }
            if deferred.len() == before {
                let (name, overrides) = &deferred[0];
                return Err(ConfigError::InvalidValue {
                    key: format!("profiles.{name}.extends"),
                    value: format!(
                        "unknown base profile '{}'",
                        overrides.extends.as_deref().unwrap_or(STREAMING_PROFILE)
                    ),
                });
            }
            pending = deferred;
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli_args: &CliArgs) {
        if let Some(model) = &cli_args.model {
            self.backend.model = Some(model.clone());
            self.source_attribution
                .insert("backend.model".to_string(), ConfigSource::Cli);
        }
        if let Some(base_url) = &cli_args.base_url {
            self.backend.base_url = base_url.clone();
            self.source_attribution
                .insert("backend.base_url".to_string(), ConfigSource::Cli);
        }
        if let Some(profile) = &cli_args.profile {
            self.orchestrator.default_profile = profile.clone();
            self.source_attribution
                .insert("orchestrator.default_profile".to_string(), ConfigSource::Cli);
        }
        if cli_args.no_coalesce {
            self.orchestrator.coalesce_inflight = false;
            self.source_attribution
                .insert("orchestrator.coalesce_inflight".to_string(), ConfigSource::Cli);
        }
    }

    /// Discover config file by searching upward from a given directory
    ///
    /// Walks up the directory tree looking for `.storyflow/config.toml`, stopping
    /// at repository root markers (.git, .hg, .svn) or filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir;

        loop {
            let config_path = current_dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent,
                None => break,
            }
        }

        Ok(None)
    }

    /// Load configuration from TOML file
    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: TomlConfig = toml::from_str(&content).map_err(|e| {
                    ConfigError::InvalidFile(format!("{}: {e}", path.display()))
                })?;
                Ok(config)
            }
            // Missing config file is OK - defaults apply
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_toml_rejects_unknown_sections() {
        let parsed: Result<TomlConfig, _> = toml::from_str("[telemetry]\nenabled = true\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let parsed = Config::load_config_file(&temp.path().join("absent.toml"))?;
        assert!(parsed.backend.is_none());
        assert!(parsed.profiles.is_empty());
        Ok(())
    }
}
