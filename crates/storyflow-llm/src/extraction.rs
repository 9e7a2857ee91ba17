//! Candidate extraction from raw model output
//!
//! Models wrap the requested document in prose or code fences often enough
//! that the response body cannot be parsed directly. The final candidate is
//! the last balanced `{...}` span that parses as a JSON object.

use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

/// Marks the beginning of the narrative-items array in a partial buffer
static NARRATIVE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:stories|narrative_items)"\s*:\s*\["#).unwrap());

/// Locate the last well-formed JSON object in `text`.
///
/// Starts at the final `}` and walks back to its matching `{`, skipping
/// braces inside string literals. If that span does not parse, earlier
/// closing braces are tried in turn.
#[must_use]
pub fn last_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_end = bytes.len();

    while let Some(close) = bytes[..search_end].iter().rposition(|&b| b == b'}') {
        if let Some(open) = matching_open_brace(bytes, close) {
            let span = &text[open..=close];
            if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(span).is_ok() {
                return Some(span);
            }
            trace!(open, close, "Balanced span is not valid JSON, trying an earlier one");
        }
        search_end = close;
    }
    None
}

fn matching_open_brace(bytes: &[u8], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;

    for idx in (0..=close).rev() {
        match bytes[idx] {
            b'"' if !is_escaped(bytes, idx) => in_string = !in_string,
            b'}' if !in_string => depth += 1,
            b'{' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// A quote is escaped when preceded by an odd number of backslashes.
fn is_escaped(bytes: &[u8], idx: usize) -> bool {
    bytes[..idx].iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 1
}

/// Best-effort detector for narrative items in a partially received document.
///
/// Fed the whole accumulated buffer after each fragment. Reports once when
/// the narrative array first appears, then again each time another complete
/// item has arrived. This is a progress hint only; the final document is
/// validated separately once the stream ends.
#[derive(Debug, Default)]
pub struct NarrativeProbe {
    array_start: Option<usize>,
    reported: Option<usize>,
}

impl NarrativeProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the narrative array has been seen yet
    #[must_use]
    pub fn detected(&self) -> bool {
        self.array_start.is_some()
    }

    /// Inspect the buffer and return the items complete so far, if that is news.
    pub fn observe(&mut self, buffer: &str) -> Option<Vec<String>> {
        let start = match self.array_start {
            Some(start) => start,
            None => {
                let found = NARRATIVE_MARKER.find(buffer)?.end();
                self.array_start = Some(found);
                found
            }
        };

        let items = complete_string_items(buffer.get(start..)?);
        let is_news = match self.reported {
            None => true,
            Some(count) => items.len() > count,
        };
        if !is_news {
            return None;
        }
        self.reported = Some(items.len());
        Some(items)
    }
}

/// Parse the complete string literals at the head of a JSON array body.
fn complete_string_items(body: &str) -> Vec<String> {
    let bytes = body.as_bytes();
    let mut items = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && (bytes[pos].is_ascii_whitespace() || bytes[pos] == b',') {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] != b'"' {
            break;
        }
        let Some(end) = (pos + 1..bytes.len()).find(|&i| bytes[i] == b'"' && !is_escaped(bytes, i))
        else {
            break;
        };
        match serde_json::from_str::<String>(&body[pos..=end]) {
            Ok(item) => items.push(item),
            Err(_) => break,
        }
        pos = end + 1;
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_object_wrapped_in_prose() {
        let text = "Here you go:\n```json\n{\"stories\":[\"a\"],\"flow\":{\"nodes\":[]}}\n```\nEnjoy!";
        assert_eq!(
            last_json_object(text),
            Some("{\"stories\":[\"a\"],\"flow\":{\"nodes\":[]}}")
        );
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"stories":["use } carefully", "quote \" then {"],"n":1}"#;
        assert_eq!(last_json_object(text), Some(text));
    }

    #[test]
    fn test_last_of_several_objects_wins() {
        let text = r#"draft {"v":1} final {"v":2}"#;
        assert_eq!(last_json_object(text), Some(r#"{"v":2}"#));
    }

    #[test]
    fn test_falls_back_to_earlier_valid_span() {
        let text = r#"{"v":1} trailing junk {not json}"#;
        assert_eq!(last_json_object(text), Some(r#"{"v":1}"#));
    }

    #[test]
    fn test_no_object() {
        assert_eq!(last_json_object("no json here"), None);
        assert_eq!(last_json_object("unbalanced }"), None);
        assert_eq!(last_json_object(r#"{"truncated": ["#), None);
    }

    #[test]
    fn test_probe_waits_for_marker() {
        let mut probe = NarrativeProbe::new();
        assert_eq!(probe.observe("{\"conf"), None);
        assert!(!probe.detected());
    }

    #[test]
    fn test_probe_reports_detection_then_growth() {
        let mut probe = NarrativeProbe::new();

        let first = probe.observe(r#"{"stories": ["#);
        assert_eq!(first, Some(vec![]));
        assert!(probe.detected());

        assert_eq!(probe.observe(r#"{"stories": ["Given a us"#), None);

        let second = probe.observe(r#"{"stories": ["Given a user", "When"#);
        assert_eq!(second, Some(vec!["Given a user".to_string()]));

        let third = probe.observe(r#"{"stories": ["Given a user", "When \"x\"", "Then"#);
        assert_eq!(
            third,
            Some(vec!["Given a user".to_string(), "When \"x\"".to_string()])
        );
    }

    #[test]
    fn test_probe_accepts_alternate_key() {
        let mut probe = NarrativeProbe::new();
        assert_eq!(
            probe.observe(r#"{"narrative_items":["one"]"#),
            Some(vec!["one".to_string()])
        );
    }
}
