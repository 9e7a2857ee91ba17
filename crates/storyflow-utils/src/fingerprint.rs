//! Content-addressed request fingerprints
//!
//! A fingerprint is the BLAKE3 digest of `(subject id, sanitized text, domain
//! profile)` plus the generation-profile namespace, hex encoded. It is the only
//! cache key. The input type [`SanitizedText`] guarantees raw text never feeds
//! the digest.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use storyflow_redaction::SanitizedText;

/// Length of a hex-encoded fingerprint
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Fixed-width opaque request key (64 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines
    ///
    /// A deserialized value may be shorter; it is then returned whole.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives fingerprints within one namespace.
///
/// The namespace is the generation-profile name, so the same request generated
/// under a lighter and a richer profile never shares a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprinter {
    namespace: String,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new("default")
    }
}

impl Fingerprinter {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Compute the fingerprint for one request.
    ///
    /// Every field is length-prefixed, so `("ab", "c")` and `("a", "bc")` never
    /// collide regardless of the characters they contain.
    #[must_use]
    pub fn fingerprint(
        &self,
        subject_id: &str,
        text: &SanitizedText,
        domain_profile: &str,
    ) -> Fingerprint {
        let mut hasher = Hasher::new();
        for field in [
            self.namespace.as_str(),
            subject_id,
            text.as_str(),
            domain_profile,
        ] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Fingerprint(hasher.finalize().to_hex().to_string())
    }
}

/// Fingerprint in the default namespace.
#[must_use]
pub fn fingerprint(subject_id: &str, text: &SanitizedText, domain_profile: &str) -> Fingerprint {
    Fingerprinter::default().fingerprint(subject_id, text, domain_profile)
}
