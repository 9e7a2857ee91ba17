//! Wire format of a generated document and its structural checks
//!
//! ```json
//! {"stories": ["Given ..."],
//!  "flow": {"nodes": [{"id": "1", "label": "Start", "type": "start"}],
//!           "edges": [{"source": "1", "target": "2", "label": "yes", "animated": true}]},
//!  "confidence": 0.8}
//! ```
//!
//! Extra fields (positions, styles, edge ids) are ignored.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use storyflow_utils::error::ValidationError;
use storyflow_utils::types::{Artifact, Edge, Node, NodeKind, ProcessGraph};

#[derive(Debug, Deserialize)]
struct WireDocument {
    #[serde(alias = "narrative_items")]
    stories: Option<Vec<String>>,
    flow: Option<WireFlow>,
    confidence: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireFlow {
    #[serde(default)]
    nodes: Vec<WireNode>,
    #[serde(default)]
    edges: Vec<WireEdge>,
}

#[derive(Debug, Deserialize)]
struct WireNode {
    id: Value,
    label: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<WireNodeData>,
}

#[derive(Debug, Deserialize)]
struct WireNodeData {
    #[serde(rename = "type")]
    kind: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEdge {
    source: Value,
    target: Value,
    label: Option<String>,
    #[serde(default)]
    animated: bool,
}

/// Node and edge ids may arrive as strings or numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse candidate text into an [`Artifact`], enforcing shape validity.
///
/// # Errors
///
/// Returns `ValidationError::Shape` when the text is not the expected
/// document, a collection is missing or empty, a node id is duplicated, a
/// node kind is unknown, or an edge points at a node that does not exist.
pub fn parse_candidate(text: &str) -> Result<Artifact, ValidationError> {
    let doc: WireDocument = serde_json::from_str(text)
        .map_err(|e| ValidationError::shape(format!("document does not parse: {e}")))?;

    let stories = doc
        .stories
        .ok_or_else(|| ValidationError::shape("missing stories collection"))?;
    let narrative_items: Vec<String> = stories
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if narrative_items.is_empty() {
        return Err(ValidationError::shape("stories collection is empty"));
    }

    let flow = doc
        .flow
        .ok_or_else(|| ValidationError::shape("missing flow object"))?;
    let graph = parse_graph(flow)?;
    let confidence = parse_confidence(doc.confidence.as_ref())?;

    Ok(Artifact {
        narrative_items,
        graph,
        confidence,
    })
}

fn parse_graph(flow: WireFlow) -> Result<ProcessGraph, ValidationError> {
    if flow.nodes.is_empty() {
        return Err(ValidationError::shape("flow has no nodes"));
    }

    let mut seen = HashSet::new();
    let mut nodes = Vec::with_capacity(flow.nodes.len());
    for (index, wire) in flow.nodes.into_iter().enumerate() {
        let id = id_string(&wire.id)
            .ok_or_else(|| ValidationError::shape(format!("node #{index} has no usable id")))?;
        if !seen.insert(id.clone()) {
            return Err(ValidationError::shape(format!("duplicate node id '{id}'")));
        }

        let (data_kind, data_label) = match wire.data {
            Some(data) => (data.kind, data.label),
            None => (None, None),
        };
        let raw_kind = wire
            .kind
            .or(data_kind)
            .ok_or_else(|| ValidationError::shape(format!("node '{id}' has no type")))?;
        let kind = NodeKind::parse(&raw_kind).ok_or_else(|| {
            ValidationError::shape(format!("node '{id}' has unknown type '{raw_kind}'"))
        })?;

        let label = wire.label.or(data_label).unwrap_or_else(|| id.clone());
        nodes.push(Node { id, label, kind });
    }

    let mut edges = Vec::with_capacity(flow.edges.len());
    for (index, wire) in flow.edges.into_iter().enumerate() {
        let (Some(source), Some(target)) = (id_string(&wire.source), id_string(&wire.target))
        else {
            return Err(ValidationError::shape(format!(
                "edge #{index} has no usable source or target"
            )));
        };
        for endpoint in [&source, &target] {
            if !seen.contains(endpoint) {
                return Err(ValidationError::shape(format!(
                    "edge {source} -> {target} references unknown node '{endpoint}'"
                )));
            }
        }
        edges.push(Edge {
            source,
            target,
            label: wire.label.filter(|l| !l.trim().is_empty()),
            animated: wire.animated,
        });
    }

    Ok(ProcessGraph { nodes, edges })
}

/// Missing confidence counts as zero; numbers are clamped into `[0, 1]`.
fn parse_confidence(value: Option<&Value>) -> Result<f64, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(0.0).clamp(0.0, 1.0)),
        Some(other) => Err(ValidationError::shape(format!(
            "confidence must be a number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(err: ValidationError) -> String {
        match err {
            ValidationError::Shape { reason } => reason,
            other => panic!("expected shape error, got {other:?}"),
        }
    }

    #[test]
    fn test_parses_minimal_document() {
        let artifact = parse_candidate(
            r#"{"stories":["Given a user"],"flow":{"nodes":[
                {"id":"1","label":"Start","type":"start"},
                {"id":2,"data":{"type":"process","label":"Check"}}
            ],"edges":[{"id":"e1","source":"1","target":2,"animated":true}]},"confidence":0.7}"#,
        )
        .unwrap();

        assert_eq!(artifact.narrative_items, vec!["Given a user"]);
        assert_eq!(artifact.graph.nodes[1].id, "2");
        assert_eq!(artifact.graph.nodes[1].kind, NodeKind::Action);
        assert_eq!(artifact.graph.nodes[1].label, "Check");
        assert!(artifact.graph.edges[0].animated);
        assert!((artifact.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_defaults_and_clamps() {
        let base = r#"{"stories":["s"],"flow":{"nodes":[{"id":"a","type":"start"}],"edges":[]}"#;
        assert_eq!(parse_candidate(&format!("{base}}}")).unwrap().confidence, 0.0);
        assert_eq!(
            parse_candidate(&format!("{base},\"confidence\":7}}")).unwrap().confidence,
            1.0
        );
        assert_eq!(
            parse_candidate(&format!("{base},\"confidence\":-2}}")).unwrap().confidence,
            0.0
        );
        let err = parse_candidate(&format!("{base},\"confidence\":\"high\"}}")).unwrap_err();
        assert!(reason(err).contains("confidence"));
    }

    #[test]
    fn test_dangling_edge_is_shape_error() {
        let err = parse_candidate(
            r#"{"stories":["s"],"flow":{"nodes":[{"id":"a","type":"start"}],
                "edges":[{"source":"a","target":"ghost"}]}}"#,
        )
        .unwrap_err();
        assert!(reason(err).contains("ghost"));
    }

    #[test]
    fn test_unknown_kind_and_duplicates_are_shape_errors() {
        let err = parse_candidate(
            r#"{"stories":["s"],"flow":{"nodes":[{"id":"a","type":"swimlane"}],"edges":[]}}"#,
        )
        .unwrap_err();
        assert!(reason(err).contains("swimlane"));

        let err = parse_candidate(
            r#"{"stories":["s"],"flow":{"nodes":[{"id":"a","type":"start"},{"id":"a","type":"end"}],"edges":[]}}"#,
        )
        .unwrap_err();
        assert!(reason(err).contains("duplicate"));
    }

    #[test]
    fn test_empty_collections_are_shape_errors() {
        for text in [
            r#"{"flow":{"nodes":[{"id":"a","type":"start"}]}}"#,
            r#"{"stories":["  "],"flow":{"nodes":[{"id":"a","type":"start"}]}}"#,
            r#"{"stories":["s"]}"#,
            r#"{"stories":["s"],"flow":{"nodes":[],"edges":[]}}"#,
            "not json at all",
        ] {
            assert!(parse_candidate(text).unwrap_err().is_shape(), "{text}");
        }
    }
}
