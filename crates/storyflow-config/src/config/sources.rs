use std::collections::BTreeMap;

use super::{Config, ConfigSource};

fn source_label(source: Option<&ConfigSource>) -> String {
    source.copied().unwrap_or(ConfigSource::Default).to_string()
}

impl Config {
    /// Get effective configuration as key-value pairs with source attribution
    ///
    /// Keys are sorted so the output is stable for display.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add_config = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key));
            config.insert(key.to_string(), (value, source));
        };

        add_config("backend.base_url", self.backend.base_url.clone());
        add_config("backend.api_key_env", self.backend.api_key_env.clone());
        if let Some(model) = &self.backend.model {
            add_config("backend.model", model.clone());
        }
        add_config(
            "backend.connect_timeout_secs",
            self.backend.connect_timeout_secs.to_string(),
        );
        add_config("cache.max_entries", self.cache.max_entries.to_string());
        add_config(
            "orchestrator.coalesce_inflight",
            self.orchestrator.coalesce_inflight.to_string(),
        );
        add_config(
            "orchestrator.default_profile",
            self.orchestrator.default_profile.clone(),
        );

        for (name, profile) in &self.profiles {
            let summary = format!(
                "mode={} model={} depth={}/{}/{} attempts={} on_exhaustion={} ttl={}s C={}{}",
                profile.mode,
                profile.model,
                profile.min_nodes,
                profile.min_edges,
                profile.min_decisions,
                profile.max_attempts,
                profile.exhaustion_policy,
                profile.cache_ttl_secs,
                profile.concurrency,
                profile
                    .rate_limit
                    .map(|r| format!(" R={}/{}s", r.max_calls, r.window_secs))
                    .unwrap_or_default(),
            );
            add_config(&format!("profiles.{name}"), summary);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_lists_profiles_with_sources() {
        let mut config = Config::default();
        config
            .source_attribution
            .insert("backend.base_url".to_string(), ConfigSource::Cli);

        let effective = config.effective_config();
        assert_eq!(effective["backend.base_url"].1, "cli");
        assert_eq!(effective["cache.max_entries"].1, "default");

        let (batch, _) = &effective["profiles.batch"];
        assert!(batch.contains("mode=unary"));
        assert!(batch.contains("R=50/60s"));
        assert!(!effective.contains_key("backend.model"));
    }
}
