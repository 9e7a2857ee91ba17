use storyflow_utils::error::ConfigError;

use super::{Config, GenerationProfile};

fn invalid(key: impl Into<String>, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(invalid("backend.base_url", "must not be empty"));
        }
        if !(self.backend.base_url.starts_with("http://")
            || self.backend.base_url.starts_with("https://"))
        {
            return Err(invalid(
                "backend.base_url",
                format!("'{}' must start with http:// or https://", self.backend.base_url),
            ));
        }
        if self.backend.api_key_env.trim().is_empty() {
            return Err(invalid("backend.api_key_env", "must not be empty"));
        }
        if self.backend.connect_timeout_secs == 0 {
            return Err(invalid(
                "backend.connect_timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be greater than 0"));
        }

        if !self.profiles.contains_key(&self.orchestrator.default_profile) {
            return Err(ConfigError::UnknownProfile(
                self.orchestrator.default_profile.clone(),
            ));
        }

        for (name, profile) in &self.profiles {
            validate_profile(name, profile)?;
        }

        Ok(())
    }
}

fn validate_profile(name: &str, profile: &GenerationProfile) -> Result<(), ConfigError> {
    let key = |field: &str| format!("profiles.{name}.{field}");

    if profile.model.trim().is_empty() {
        return Err(invalid(key("model"), "must not be empty"));
    }
    if !(0.0..=2.0).contains(&profile.temperature) {
        return Err(invalid(
            key("temperature"),
            format!("{} is outside [0, 2]", profile.temperature),
        ));
    }
    if profile.max_tokens == 0 {
        return Err(invalid(key("max_tokens"), "must be greater than 0"));
    }
    if profile.max_attempts == 0 {
        return Err(invalid(key("max_attempts"), "must be at least 1"));
    }
    if profile.cache_ttl_secs == 0 {
        return Err(invalid(key("cache_ttl_secs"), "must be greater than 0"));
    }
    if profile.concurrency == 0 {
        return Err(invalid(key("concurrency"), "must be at least 1"));
    }
    if profile.request_timeout_secs == 0 {
        return Err(invalid(key("request_timeout_secs"), "must be greater than 0"));
    }
    if let Some(rate_limit) = profile.rate_limit {
        if rate_limit.max_calls == 0 {
            return Err(invalid(key("rate_limit.max_calls"), "must be at least 1"));
        }
        if rate_limit.window_secs == 0 {
            return Err(invalid(key("rate_limit.window_secs"), "must be greater than 0"));
        }
    }

    let backoff = &profile.backoff;
    if !backoff.factor.is_finite() || backoff.factor < 1.0 {
        return Err(invalid(
            key("backoff.factor"),
            format!("{} must be at least 1.0", backoff.factor),
        ));
    }
    if backoff.base_ms > backoff.max_ms {
        return Err(invalid(
            key("backoff.base_ms"),
            format!("{} exceeds backoff.max_ms {}", backoff.base_ms, backoff.max_ms),
        ));
    }
    if backoff.max_tries == 0 {
        return Err(invalid(key("backoff.max_tries"), "must be at least 1"));
    }

    Ok(())
}
