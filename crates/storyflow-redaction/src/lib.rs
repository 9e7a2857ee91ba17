//! PII sanitization for requirement text
//!
//! Every piece of user-supplied text passes through [`Sanitizer`] before it is
//! fingerprinted, cached, logged, or sent to an LLM backend. Redaction replaces
//! email-like and phone-like substrings with fixed placeholder tokens.
//!
//! Patterns are applied in table order: emails first, then phone numbers, so the
//! digits inside an address (`jane.1987@example.com`) never get half-redacted by
//! the phone pattern.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// Placeholder substituted for email addresses
pub const EMAIL_PLACEHOLDER: &str = "[redacted-email]";

/// Placeholder substituted for phone-like digit runs
pub const PHONE_PLACEHOLDER: &str = "[redacted-phone]";

// =========================================================================
// Canonical Pattern Definitions
// =========================================================================

/// Definition of a PII pattern.
///
/// This is the single source of truth for what the sanitizer redacts. The same
/// table drives runtime redaction and the tests that assert nothing survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiiPatternDef {
    /// Unique identifier for the pattern (e.g., "email")
    pub id: &'static str,
    /// The regex pattern string
    pub regex: &'static str,
    /// Token written in place of every match
    pub placeholder: &'static str,
    /// Human-readable description
    pub description: &'static str,
}

/// Canonical list of PII patterns, in application order.
pub static DEFAULT_PII_PATTERNS: &[PiiPatternDef] = &[
    PiiPatternDef {
        id: "email",
        regex: r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}",
        placeholder: EMAIL_PLACEHOLDER,
        description: "Email addresses",
    },
    // Six or more digits, optionally separated by spaces, hyphens or
    // parentheses, with an optional leading '+'.
    PiiPatternDef {
        id: "phone",
        regex: r"\+?\(?\d(?:[ ()\-]*\d){5,}",
        placeholder: PHONE_PLACEHOLDER,
        description: "Phone-number-like digit runs",
    },
];

/// Returns the canonical list of PII pattern definitions.
#[must_use]
pub fn default_pattern_defs() -> &'static [PiiPatternDef] {
    DEFAULT_PII_PATTERNS
}

static COMPILED_DEFAULTS: LazyLock<Vec<CompiledPattern>> = LazyLock::new(|| {
    DEFAULT_PII_PATTERNS
        .iter()
        .map(|def| CompiledPattern {
            def,
            regex: Regex::new(def.regex).unwrap(),
        })
        .collect()
});

static DEFAULT_SANITIZER: LazyLock<Sanitizer> = LazyLock::new(Sanitizer::new);

#[derive(Debug, Clone)]
struct CompiledPattern {
    def: &'static PiiPatternDef,
    regex: Regex,
}

/// Requirement text with all PII patterns replaced by placeholders.
///
/// The only way to obtain one is through [`Sanitizer::sanitize`], so holding a
/// `SanitizedText` is proof the redaction pass has run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SanitizedText(String);

impl SanitizedText {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for SanitizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-pattern redaction count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedactionCount {
    pub pattern_id: &'static str,
    pub count: usize,
}

/// Result of a sanitization pass with match statistics (never the matched text)
#[derive(Debug, Clone)]
pub struct SanitizationReport {
    pub text: SanitizedText,
    pub redactions: Vec<RedactionCount>,
}

impl SanitizationReport {
    /// Total number of substrings replaced
    #[must_use]
    pub fn total(&self) -> usize {
        self.redactions.iter().map(|r| r.count).sum()
    }
}

/// PII sanitizer.
///
/// Deterministic and total: any input string produces a [`SanitizedText`].
#[derive(Debug, Clone)]
pub struct Sanitizer {
    patterns: Vec<CompiledPattern>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    /// Create a sanitizer with the default pattern table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: COMPILED_DEFAULTS.clone(),
        }
    }

    /// Redact every PII match in `text`.
    #[must_use]
    pub fn sanitize(&self, text: &str) -> SanitizedText {
        self.sanitize_with_report(text).text
    }

    /// Redact every PII match and report how many substrings each pattern replaced.
    #[must_use]
    pub fn sanitize_with_report(&self, text: &str) -> SanitizationReport {
        let mut redacted = text.to_string();
        let mut redactions = Vec::with_capacity(self.patterns.len());

        for pattern in &self.patterns {
            let count = pattern.regex.find_iter(&redacted).count();
            if count > 0 {
                redacted = pattern
                    .regex
                    .replace_all(&redacted, pattern.def.placeholder)
                    .into_owned();
            }
            redactions.push(RedactionCount {
                pattern_id: pattern.def.id,
                count,
            });
        }

        SanitizationReport {
            text: SanitizedText(redacted),
            redactions,
        }
    }

    /// Check whether any PII pattern matches `text`.
    #[must_use]
    pub fn contains_pii(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(text))
    }

    /// IDs of the patterns that match `text`
    #[must_use]
    pub fn matching_patterns(&self, text: &str) -> Vec<&'static str> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.def.id)
            .collect()
    }
}

/// Sanitize with the process-wide default sanitizer.
#[must_use]
pub fn sanitize(text: &str) -> SanitizedText {
    DEFAULT_SANITIZER.sanitize(text)
}
