//! Property tests for the quality gate

use proptest::prelude::*;
use serde_json::json;
use storyflow_utils::types::DepthRequirements;
use storyflow_validation::{QualityGate, Verdict};

fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(64);
    ProptestConfig::with_cases(cases)
}

/// Chain of `nodes` nodes with `decisions` decision nodes and optional extra edges.
fn document(nodes: usize, decisions: usize, extra_edges: &[(usize, usize)]) -> serde_json::Value {
    let node_values: Vec<_> = (0..nodes)
        .map(|i| {
            let kind = if i == 0 {
                "start"
            } else if i + 1 == nodes {
                "end"
            } else if i <= decisions {
                "decision"
            } else {
                "action"
            };
            json!({"id": format!("n{i}"), "label": format!("Node {i}"), "type": kind})
        })
        .collect();
    let mut edges: Vec<_> = (1..nodes)
        .map(|i| json!({"source": format!("n{}", i - 1), "target": format!("n{i}")}))
        .collect();
    for (s, t) in extra_edges {
        edges.push(json!({"source": format!("n{s}"), "target": format!("n{t}")}));
    }
    json!({"stories": ["Given a user"], "flow": {"nodes": node_values, "edges": edges}})
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn prop_dangling_edges_always_rejected(
        nodes in 1usize..30,
        decisions in 0usize..10,
        dangling_side in any::<bool>(),
    ) {
        let mut doc = document(nodes, decisions, &[]);
        let ghost = format!("n{}", nodes + 5);
        let edge = if dangling_side {
            json!({"source": "n0", "target": ghost})
        } else {
            json!({"source": ghost, "target": "n0"})
        };
        doc["flow"]["edges"].as_array_mut().unwrap().push(edge);

        let gate = QualityGate::new(DepthRequirements::default());
        match gate.evaluate(&doc.to_string()) {
            Verdict::Reject(rejection) => prop_assert!(rejection.error.is_shape()),
            Verdict::Accept(_) => prop_assert!(false, "dangling edge accepted"),
        }
    }

    #[test]
    fn prop_counts_decide_depth(
        nodes in 2usize..20,
        decisions in 0usize..6,
        min_nodes in 0usize..20,
        min_edges in 0usize..20,
        min_decisions in 0usize..6,
    ) {
        let decisions = decisions.min(nodes - 2);
        let doc = document(nodes, decisions, &[]).to_string();
        let gate = QualityGate::new(DepthRequirements {
            min_nodes,
            min_edges,
            min_decisions,
            ..DepthRequirements::default()
        });

        let expected = nodes >= min_nodes && nodes - 1 >= min_edges && decisions >= min_decisions;
        prop_assert_eq!(gate.evaluate(&doc).is_accept(), expected);
    }
}

#[test]
fn test_accepted_artifact_preserves_order() {
    let doc = document(4, 1, &[(2, 1)]);
    let gate = QualityGate::new(DepthRequirements::default());
    let Verdict::Accept(artifact) = gate.evaluate(&doc.to_string()) else {
        panic!("expected accept");
    };
    let ids: Vec<_> = artifact.graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, ["n0", "n1", "n2", "n3"]);
    assert_eq!(artifact.graph.edges.len(), 4);
    assert_eq!(artifact.confidence, 0.0);
}
