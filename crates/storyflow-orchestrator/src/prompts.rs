//! Generation instructions and their escalation history

use storyflow_utils::error::ValidationError;
use storyflow_utils::types::{DepthRequirements, InvocationMode};

/// Domain label used when a request does not name one
pub const DEFAULT_DOMAIN: &str = "business";

const WIRE_FORMAT: &str = r#"{"stories":[string],"flow":{"nodes":[{"id":string,"label":string,"type":"start"|"action"|"decision"|"end"|"loop"}],"edges":[{"source":string,"target":string,"label"?:string,"animated"?:boolean}]},"confidence":number}"#;

/// Base instructions plus every corrective note added so far.
///
/// Notes accumulate in order; the rendered prompt always contains all of
/// them, not just the latest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInstructions {
    base: String,
    escalation_notes: Vec<String>,
}

impl PromptInstructions {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            escalation_notes: Vec::new(),
        }
    }

    /// Instructions for a profile, embedding the domain label and thresholds.
    ///
    /// Streaming profiles get the compact template; unary profiles get the
    /// exhaustive one.
    #[must_use]
    pub fn for_profile(mode: InvocationMode, domain: &str, depth: &DepthRequirements) -> Self {
        let domain = match domain.trim() {
            "" => DEFAULT_DOMAIN,
            d => d,
        };
        let base = match mode {
            InvocationMode::Streaming => compact_template(domain, depth),
            InvocationMode::Unary => thorough_template(domain, depth),
        };
        Self::new(base)
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.escalation_notes.push(note.into());
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn escalation_notes(&self) -> &[String] {
        &self.escalation_notes
    }

    /// Base text followed by each note on its own line
    #[must_use]
    pub fn render(&self) -> String {
        let mut rendered = self.base.clone();
        for note in &self.escalation_notes {
            rendered.push('\n');
            rendered.push_str(note);
        }
        rendered
    }
}

fn compact_template(domain: &str, depth: &DepthRequirements) -> String {
    format!(
        "You are a {domain} analyst. Produce compact, actionable outputs.\n\
         1) Generate 3-6 concise Gherkin user stories (Given-When-Then), grounded in the input.\n\
         2) Build a process flow JSON with at least {nodes} nodes and {edges} edges, at least {decisions} decision nodes, \
         explicit success and error endings. Avoid loops and groups. Keep labels short.\n\
         3) Keep JSON minimal for speed.\n\
         Output ONLY strict JSON matching:\n{WIRE_FORMAT}",
        nodes = depth.min_nodes,
        edges = depth.min_edges,
        decisions = depth.min_decisions,
    )
}

fn thorough_template(domain: &str, depth: &DepthRequirements) -> String {
    let mut extras = Vec::new();
    if depth.require_loop {
        extras.push("at least 1 loop");
    }
    if depth.require_error_path {
        extras.push("explicit error branches");
    }
    let extras = if extras.is_empty() {
        String::new()
    } else {
        format!(", {}", extras.join(", "))
    };

    format!(
        "You are a {domain} business analyst. Based on this specific user input, deeply analyze requirements \
         (identify roles, actions, conditions, edge cases).\n\
         Generate 5-10 precise Gherkin user stories (full Given-When-Then). Then build a comprehensive process flow \
         JSON with at least {nodes} nodes and {edges} edges, at least {decisions} decision nodes{extras}. \
         Every node must be grounded in the input semantics. Mark loop-back edges with \"animated\": true.\n\
         Output ONLY valid JSON:\n{WIRE_FORMAT}\n\
         Domain focus: {domain}.",
        nodes = depth.min_nodes,
        edges = depth.min_edges,
        decisions = depth.min_decisions,
    )
}

/// Corrective note appended after a rejected attempt
#[must_use]
pub fn escalation_note(rejection: &ValidationError, depth: &DepthRequirements) -> String {
    match rejection {
        ValidationError::Depth { .. } => format!(
            "Ensure depth: nodes >= {}, edges >= {}, decisions >= {}, include a retry loop and explicit error branches. \
             Ground all steps in the provided input.",
            depth.min_nodes, depth.min_edges, depth.min_decisions
        ),
        ValidationError::Shape { reason } => {
            format!("Return STRICT JSON only; fix any JSON errors. Previous problem: {reason}.")
        }
    }
}
