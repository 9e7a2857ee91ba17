use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request to turn requirement text into stories and a process flow.
///
/// Built once by the caller and consumed by the orchestrator. The raw text is
/// never logged, fingerprinted or sent upstream; only its sanitized form is.
///
/// # Example
///
/// ```rust
/// use storyflow_utils::types::GenerationRequest;
///
/// let request = GenerationRequest::new("p1", "User can log in with email and password.", "generic");
/// assert_eq!(request.subject_id, "p1");
/// assert_eq!(request.domain_profile, "generic");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Opaque project identity
    pub subject_id: String,
    /// Free-form requirement text as supplied by the user
    pub raw_text: String,
    /// Label influencing prompt phrasing (e.g. "fintech", "generic")
    pub domain_profile: String,
    pub issued_at: DateTime<Utc>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        raw_text: impl Into<String>,
        domain_profile: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            raw_text: raw_text.into(),
            domain_profile: domain_profile.into(),
            issued_at: Utc::now(),
        }
    }
}

/// How a single backend call delivers its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMode {
    /// One request, one complete response body
    #[default]
    Unary,
    /// Incremental event frames accumulated into one buffer
    Streaming,
}

impl InvocationMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::Streaming => "streaming",
        }
    }
}

impl fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do once every quality attempt has been rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Surface the last rejection as a terminal error
    #[default]
    Fail,
    /// Return the most recent parseable rejected candidate, marked as best-effort
    BestEffort,
}

impl fmt::Display for ExhaustionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// Minimum structural depth a candidate must reach to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DepthRequirements {
    pub min_nodes: usize,
    pub min_edges: usize,
    pub min_decisions: usize,
    /// Require a loop node, an animated edge, or an edge labelled as a loop
    pub require_loop: bool,
    /// Require at least one path that ends in an error outcome
    pub require_error_path: bool,
}

/// Kind of a process-graph node.
///
/// `process` is accepted on input as an alias of [`NodeKind::Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    #[serde(alias = "process")]
    Action,
    Decision,
    End,
    Loop,
}

impl NodeKind {
    /// Parse a node kind label, case-insensitively.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "action" | "process" => Some(Self::Action),
            "decision" => Some(Self::Decision),
            "end" => Some(Self::End),
            "loop" => Some(Self::Loop),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Action => "action",
            Self::Decision => "decision",
            Self::End => "end",
            Self::Loop => "loop",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub animated: bool,
}

/// Directed process graph of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProcessGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ProcessGraph {
    /// Look up a node by id
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Number of nodes of the given kind
    #[must_use]
    pub fn count_kind(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}

/// An accepted (or best-effort) generation result.
///
/// Immutable once produced; the cache and callers share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub narrative_items: Vec<String>,
    pub graph: ProcessGraph,
    /// Backend-reported confidence, clamped into `[0, 1]`
    pub confidence: f64,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    Config,
    /// Built-in default value (lowest precedence).
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Config => write!(f, "config"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_accepts_process_alias() {
        let kind: NodeKind = serde_json::from_str("\"process\"").unwrap();
        assert_eq!(kind, NodeKind::Action);
        assert_eq!(NodeKind::parse("Process"), Some(NodeKind::Action));
        assert_eq!(NodeKind::parse("subprocess"), None);
    }

    #[test]
    fn test_node_kind_serializes_lowercase() {
        let json = serde_json::to_string(&NodeKind::Decision).unwrap();
        assert_eq!(json, "\"decision\"");
    }

    #[test]
    fn test_edge_omits_default_fields() {
        let edge = Edge {
            source: "a".into(),
            target: "b".into(),
            label: None,
            animated: false,
        };
        assert_eq!(
            serde_json::to_string(&edge).unwrap(),
            r#"{"source":"a","target":"b"}"#
        );
    }

    #[test]
    fn test_graph_counts_kinds() {
        let graph = ProcessGraph {
            nodes: vec![
                Node {
                    id: "s".into(),
                    label: "Start".into(),
                    kind: NodeKind::Start,
                },
                Node {
                    id: "d1".into(),
                    label: "Valid?".into(),
                    kind: NodeKind::Decision,
                },
                Node {
                    id: "d2".into(),
                    label: "Locked?".into(),
                    kind: NodeKind::Decision,
                },
            ],
            edges: vec![],
        };
        assert_eq!(graph.count_kind(NodeKind::Decision), 2);
        assert_eq!(graph.count_kind(NodeKind::Loop), 0);
        assert_eq!(graph.node("d1").map(|n| n.label.as_str()), Some("Valid?"));
    }

    #[test]
    fn test_modes_and_policies_round_trip_names() {
        let mode: InvocationMode = serde_json::from_str("\"streaming\"").unwrap();
        assert_eq!(mode, InvocationMode::Streaming);
        let policy: ExhaustionPolicy = serde_json::from_str("\"best_effort\"").unwrap();
        assert_eq!(policy, ExhaustionPolicy::BestEffort);
        assert_eq!(policy.to_string(), "best_effort");
    }
}
