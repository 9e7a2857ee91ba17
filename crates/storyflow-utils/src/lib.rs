pub mod cache;
pub mod error;
pub mod exit_codes;
pub mod fingerprint;
pub mod logging;
pub mod types;

pub use storyflow_redaction::SanitizedText;
