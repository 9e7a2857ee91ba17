use std::path::PathBuf;

/// Command-line overrides, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit config file; skips discovery
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub profile: Option<String>,
    pub base_url: Option<String>,
    /// Disable in-flight coalescing for this run
    pub no_coalesce: bool,
}
