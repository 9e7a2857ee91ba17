//! Candidate documents for tests

use serde_json::{Value, json};

use storyflow_utils::types::DepthRequirements;

/// Builds candidate JSON text in the backend wire format.
#[derive(Debug, Clone, Default)]
pub struct CandidateBuilder {
    stories: Vec<String>,
    nodes: Vec<Value>,
    edges: Vec<Value>,
    confidence: Option<f64>,
}

impl CandidateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A straight path `n0 -> n1 -> ...` of `nodes` nodes.
    ///
    /// `n0` is the start, the last node is a plain end, and the `decisions`
    /// nodes right after the start are decisions.
    #[must_use]
    pub fn chain(nodes: usize, decisions: usize) -> Self {
        let mut builder = Self::new();
        for i in 0..nodes {
            let (kind, label) = if i == 0 {
                ("start", "Begin".to_string())
            } else if i + 1 == nodes {
                ("end", "Done".to_string())
            } else if i <= decisions {
                ("decision", format!("Check {i}?"))
            } else {
                ("action", format!("Step {i}"))
            };
            builder = builder.node(&format!("n{i}"), kind, &label);
        }
        for i in 1..nodes {
            builder = builder.edge(&format!("n{}", i - 1), &format!("n{i}"));
        }
        builder
    }

    /// Smallest chain that passes `req`, with a loop and error ending when required.
    #[must_use]
    pub fn satisfying(req: &DepthRequirements) -> Self {
        let nodes = req
            .min_nodes
            .max(req.min_edges + 1)
            .max(req.min_decisions + 2)
            .max(3);
        let mut builder = Self::chain(nodes, req.min_decisions);
        if req.require_loop {
            builder = builder.animated_edge(&format!("n{}", nodes - 2), "n1");
        }
        if req.require_error_path {
            builder = builder
                .node("error_end", "end", "Request rejected")
                .labeled_edge("n1", "error_end", "error");
        }
        builder.confidence(0.8)
    }

    #[must_use]
    pub fn story(mut self, story: &str) -> Self {
        self.stories.push(story.to_string());
        self
    }

    #[must_use]
    pub fn node(mut self, id: &str, kind: &str, label: &str) -> Self {
        self.nodes
            .push(json!({"id": id, "label": label, "type": kind}));
        self
    }

    #[must_use]
    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(json!({"source": source, "target": target}));
        self
    }

    #[must_use]
    pub fn labeled_edge(mut self, source: &str, target: &str, label: &str) -> Self {
        self.edges
            .push(json!({"source": source, "target": target, "label": label}));
        self
    }

    #[must_use]
    pub fn animated_edge(mut self, source: &str, target: &str) -> Self {
        self.edges
            .push(json!({"source": source, "target": target, "animated": true}));
        self
    }

    #[must_use]
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Render the document. A default story is used if none was added.
    #[must_use]
    pub fn build(&self) -> String {
        let stories = if self.stories.is_empty() {
            vec!["Given a user, When they submit the form, Then it is saved".to_string()]
        } else {
            self.stories.clone()
        };
        let mut doc = json!({
            "stories": stories,
            "flow": {"nodes": self.nodes, "edges": self.edges},
        });
        if let Some(confidence) = self.confidence {
            doc["confidence"] = json!(confidence);
        }
        doc.to_string()
    }
}
