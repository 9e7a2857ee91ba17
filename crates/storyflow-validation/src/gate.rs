use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::document::parse_candidate;
use storyflow_utils::error::ValidationError;
use storyflow_utils::types::{Artifact, DepthRequirements, NodeKind, ProcessGraph};

/// Words that mark an ending as an error outcome
static ERROR_ENDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error|fail|reject|denied|cancel").unwrap());

/// Outcome of evaluating one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(Artifact),
    Reject(Rejection),
}

impl Verdict {
    #[must_use]
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept(_))
    }
}

/// Why a candidate was turned down.
///
/// `candidate` holds the parsed artifact when the rejection was for depth
/// only, so a best-effort caller can still use it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub error: ValidationError,
    pub candidate: Option<Artifact>,
}

/// Accept/reject decision for generated candidates.
///
/// Two checks, both required: shape validity (parses, references resolve,
/// nothing essential is empty) and depth (configured minimum counts plus the
/// optional loop and error-ending requirements). Rejection is a normal
/// outcome, not an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    requirements: DepthRequirements,
}

impl QualityGate {
    #[must_use]
    pub fn new(requirements: DepthRequirements) -> Self {
        Self { requirements }
    }

    #[must_use]
    pub fn requirements(&self) -> &DepthRequirements {
        &self.requirements
    }

    pub fn evaluate(&self, candidate: &str) -> Verdict {
        let artifact = match parse_candidate(candidate) {
            Ok(artifact) => artifact,
            Err(error) => {
                debug!(%error, "Candidate rejected for shape");
                return Verdict::Reject(Rejection {
                    error,
                    candidate: None,
                });
            }
        };

        let shortfalls = self.depth_shortfalls(&artifact.graph);
        if shortfalls.is_empty() {
            debug!(
                nodes = artifact.graph.nodes.len(),
                edges = artifact.graph.edges.len(),
                stories = artifact.narrative_items.len(),
                "Candidate accepted"
            );
            return Verdict::Accept(artifact);
        }

        debug!(shortfalls = ?shortfalls, "Candidate rejected for depth");
        Verdict::Reject(Rejection {
            error: ValidationError::Depth { shortfalls },
            candidate: Some(artifact),
        })
    }

    fn depth_shortfalls(&self, graph: &ProcessGraph) -> Vec<String> {
        let req = &self.requirements;
        let mut shortfalls = Vec::new();

        let nodes = graph.nodes.len();
        if nodes < req.min_nodes {
            shortfalls.push(format!("nodes {nodes} < {}", req.min_nodes));
        }
        let edges = graph.edges.len();
        if edges < req.min_edges {
            shortfalls.push(format!("edges {edges} < {}", req.min_edges));
        }
        let decisions = graph.count_kind(NodeKind::Decision);
        if decisions < req.min_decisions {
            shortfalls.push(format!("decisions {decisions} < {}", req.min_decisions));
        }
        if req.require_loop && !has_loop(graph) {
            shortfalls.push("no loop".to_string());
        }
        if req.require_error_path && !has_error_path(graph) {
            shortfalls.push("no error ending".to_string());
        }
        shortfalls
    }
}

/// A loop is a loop-kind node, an animated edge, or an edge labelled as a loop.
#[must_use]
pub fn has_loop(graph: &ProcessGraph) -> bool {
    graph.nodes.iter().any(|n| n.kind == NodeKind::Loop)
        || graph.edges.iter().any(|e| {
            e.animated
                || e.label
                    .as_deref()
                    .is_some_and(|l| l.to_ascii_lowercase().contains("loop"))
        })
}

/// An error ending is an end node named like a failure, or an edge into an
/// end node whose label names a failure.
#[must_use]
pub fn has_error_path(graph: &ProcessGraph) -> bool {
    let is_end = |id: &str| graph.node(id).is_some_and(|n| n.kind == NodeKind::End);

    graph
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::End)
        .any(|n| ERROR_ENDING.is_match(&n.label) || ERROR_ENDING.is_match(&n.id))
        || graph.edges.iter().any(|e| {
            is_end(&e.target)
                && e.label
                    .as_deref()
                    .is_some_and(|l| ERROR_ENDING.is_match(l))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CandidateBuilder;

    fn gate(nodes: usize, edges: usize, decisions: usize) -> QualityGate {
        QualityGate::new(DepthRequirements {
            min_nodes: nodes,
            min_edges: edges,
            min_decisions: decisions,
            ..DepthRequirements::default()
        })
    }

    #[test]
    fn test_shallow_candidate_depends_on_profile() {
        // 5 nodes, 4 edges, no decisions
        let text = CandidateBuilder::chain(5, 0).build();

        match gate(8, 7, 2).evaluate(&text) {
            Verdict::Reject(rejection) => {
                assert!(rejection.error.is_depth());
                let shortfalls = rejection.error.to_string();
                assert!(shortfalls.contains("nodes 5 < 8"));
                assert!(shortfalls.contains("edges 4 < 7"));
                assert!(shortfalls.contains("decisions 0 < 2"));
                assert!(rejection.candidate.is_some());
            }
            Verdict::Accept(_) => panic!("shallow candidate accepted"),
        }

        assert!(gate(4, 3, 0).evaluate(&text).is_accept());
    }

    #[test]
    fn test_dangling_edge_rejected_regardless_of_counts() {
        let text = CandidateBuilder::chain(12, 4).edge("n0", "missing").build();
        match gate(0, 0, 0).evaluate(&text) {
            Verdict::Reject(rejection) => {
                assert!(rejection.error.is_shape());
                assert!(rejection.candidate.is_none());
            }
            Verdict::Accept(_) => panic!("dangling edge accepted"),
        }
    }

    #[test]
    fn test_loop_detection() {
        let plain = CandidateBuilder::chain(4, 1);
        let graph = |b: CandidateBuilder| crate::parse_candidate(&b.build()).unwrap().graph;

        assert!(!has_loop(&graph(plain.clone())));
        assert!(has_loop(&graph(plain.clone().animated_edge("n2", "n1"))));
        assert!(has_loop(&graph(plain.clone().labeled_edge("n2", "n1", "Retry LOOP"))));
        assert!(has_loop(&graph(plain.node("l", "loop", "Poll status"))));
    }

    #[test]
    fn test_error_path_detection() {
        let plain = CandidateBuilder::chain(4, 1);
        let graph = |b: CandidateBuilder| crate::parse_candidate(&b.build()).unwrap().graph;

        assert!(!has_error_path(&graph(plain.clone())));
        assert!(has_error_path(&graph(
            plain.clone().node("x", "end", "Payment Failed").edge("n1", "x")
        )));
        assert!(has_error_path(&graph(
            plain.clone().node("access_denied", "end", "Stop").edge("n1", "access_denied")
        )));
        assert!(has_error_path(&graph(plain.clone().labeled_edge("n1", "n3", "rejected"))));
        // Error label into a non-end node does not count
        assert!(!has_error_path(&graph(plain.labeled_edge("n2", "n1", "error"))));
    }

    #[test]
    fn test_rich_requirements() {
        let req = DepthRequirements {
            min_nodes: 10,
            min_edges: 9,
            min_decisions: 3,
            require_loop: true,
            require_error_path: true,
        };
        let gate = QualityGate::new(req);

        let without_loop = CandidateBuilder::chain(12, 3).build();
        match gate.evaluate(&without_loop) {
            Verdict::Reject(r) => {
                let text = r.error.to_string();
                assert!(text.contains("no loop"));
                assert!(text.contains("no error ending"));
            }
            Verdict::Accept(_) => panic!("accepted without loop"),
        }

        assert!(gate.evaluate(&CandidateBuilder::satisfying(&req).build()).is_accept());
    }
}
