//! Structural well-formedness of flow graphs.
//!
//! Runs once at compile time and aggregates every violation it finds, so a
//! single failed compile reports the complete list instead of the first
//! problem. Sub-flow bodies are validated recursively under a slash-joined
//! scope path (`my_flow/loop_1`).

use std::collections::{HashSet, VecDeque};

use crate::error::{FlowViolation, MalformedFlowError};
use crate::flow::{EndpointName, FlowDefinition};
use crate::node::NodeKind;

pub(crate) fn check_flow(def: &FlowDefinition) -> Result<(), MalformedFlowError> {
    let mut violations = Vec::new();
    check_scope(def, &def.name, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(MalformedFlowError { violations })
    }
}

fn check_scope(def: &FlowDefinition, scope: &str, violations: &mut Vec<FlowViolation>) {
    let start_edges = def
        .edges
        .iter()
        .filter(|e| e.from == EndpointName::Start)
        .count();
    match start_edges {
        0 => violations.push(FlowViolation::MissingStartEdge {
            scope: scope.to_string(),
        }),
        1 => {}
        found => violations.push(FlowViolation::MultipleStartEdges {
            scope: scope.to_string(),
            found,
        }),
    }

    let end_edges = def
        .edges
        .iter()
        .filter(|e| e.to == EndpointName::End)
        .count();
    match end_edges {
        0 => violations.push(FlowViolation::MissingEndEdge {
            scope: scope.to_string(),
        }),
        1 => {}
        found => violations.push(FlowViolation::MultipleEndEdges {
            scope: scope.to_string(),
            found,
        }),
    }

    // Builder handles make unknown endpoints unlikely, but a definition can
    // be assembled by other means.
    for edge in &def.edges {
        for endpoint in [&edge.from, &edge.to] {
            if let EndpointName::Node(name) = endpoint {
                if !def.nodes.contains_key(name) {
                    violations.push(FlowViolation::UnknownEdgeEndpoint {
                        scope: scope.to_string(),
                        node: name.clone(),
                    });
                }
            }
        }
    }

    // Reachability is only meaningful once an entry edge exists; without one
    // every node would be reported unreachable on top of MissingStartEdge.
    if start_edges > 0 {
        let reachable = flood_from_start(def);
        for name in def.nodes.keys() {
            if !reachable.contains(name.as_str()) {
                violations.push(FlowViolation::UnreachableNode {
                    scope: scope.to_string(),
                    node: name.clone(),
                });
            }
        }
    }

    for (name, node) in &def.nodes {
        if let NodeKind::Branch { .. } = node.kind {
            let fanout = def
                .edges
                .iter()
                .filter(|e| e.from == EndpointName::Node(name.clone()))
                .count();
            if fanout < 2 {
                violations.push(FlowViolation::BranchFanout {
                    scope: scope.to_string(),
                    node: name.clone(),
                    found: fanout,
                });
            }
        }

        if let Some(body) = node.body() {
            check_scope(body, &format!("{scope}/{name}"), violations);
        }
    }
}

/// BFS flood over edge adjacency starting at the START sentinel.
fn flood_from_start(def: &FlowDefinition) -> HashSet<&str> {
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&EndpointName> = def
        .edges
        .iter()
        .filter(|e| e.from == EndpointName::Start)
        .map(|e| &e.to)
        .collect();

    while let Some(endpoint) = queue.pop_front() {
        let name = match endpoint {
            EndpointName::Node(name) => name.as_str(),
            _ => continue,
        };
        if !reachable.insert(name) {
            continue;
        }
        for edge in &def.edges {
            if edge.from == EndpointName::Node(name.to_string()) {
                queue.push_back(&edge.to);
            }
        }
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowBuilder, END, START};
    use crate::node::{BranchNode, LoopNode, ScriptNode, TimerNode};

    #[test]
    fn test_minimal_valid_flow() {
        let mut flow = FlowBuilder::new("f");
        let step = flow.script(ScriptNode::new("x = 1")).unwrap();
        flow.sequence([START, step.endpoint(), END]).unwrap();
        assert!(check_flow(&flow.build()).is_ok());
    }

    #[test]
    fn test_missing_start_and_end_edges() {
        let mut flow = FlowBuilder::new("f");
        flow.script(ScriptNode::new("x = 1")).unwrap();
        let err = check_flow(&flow.build()).unwrap_err();
        assert!(err
            .violations
            .contains(&FlowViolation::MissingStartEdge { scope: "f".into() }));
        assert!(err
            .violations
            .contains(&FlowViolation::MissingEndEdge { scope: "f".into() }));
        // No reachability noise without an entry edge.
        assert!(!err
            .violations
            .iter()
            .any(|v| matches!(v, FlowViolation::UnreachableNode { .. })));
    }

    #[test]
    fn test_multiple_start_edges() {
        let mut flow = FlowBuilder::new("f");
        let a = flow.script(ScriptNode::new("a")).unwrap();
        let b = flow.script(ScriptNode::new("b")).unwrap();
        flow.edge(START, &a).unwrap();
        flow.edge(START, &b).unwrap();
        flow.edge(&a, END).unwrap();
        flow.edge(&b, END).unwrap();
        let err = check_flow(&flow.build()).unwrap_err();
        assert!(err.violations.contains(&FlowViolation::MultipleStartEdges {
            scope: "f".into(),
            found: 2
        }));
        assert!(err.violations.contains(&FlowViolation::MultipleEndEdges {
            scope: "f".into(),
            found: 2
        }));
    }

    #[test]
    fn test_unreachable_node_reported() {
        let mut flow = FlowBuilder::new("f");
        let a = flow.script(ScriptNode::new("a")).unwrap();
        let orphan = flow.script(ScriptNode::new("b").name("orphan")).unwrap();
        flow.sequence([START, a.endpoint(), END]).unwrap();
        flow.edge(&orphan, a.endpoint()).unwrap();
        let err = check_flow(&flow.build()).unwrap_err();
        assert_eq!(
            err.violations,
            vec![FlowViolation::UnreachableNode {
                scope: "f".into(),
                node: "orphan".into()
            }]
        );
    }

    #[test]
    fn test_branch_fanout_enforced() {
        let mut flow = FlowBuilder::new("f");
        let branch = flow.branch(BranchNode::new("flow.input.x > 0")).unwrap();
        flow.sequence([START, branch.endpoint(), END]).unwrap();
        let err = check_flow(&flow.build()).unwrap_err();
        assert!(err.violations.contains(&FlowViolation::BranchFanout {
            scope: "f".into(),
            node: "branch_1".into(),
            found: 1
        }));
    }

    #[test]
    fn test_branch_with_two_guarded_edges_valid() {
        let mut flow = FlowBuilder::new("f");
        let branch = flow.branch(BranchNode::new("flow.input.x > 0")).unwrap();
        let yes = flow.script(ScriptNode::new("y").name("yes")).unwrap();
        let no = flow.script(ScriptNode::new("n").name("no")).unwrap();
        flow.edge(START, &branch).unwrap();
        flow.conditional_edge(&branch, &yes, "true").unwrap();
        flow.conditional_edge(&branch, &no, "false").unwrap();
        flow.edge(&yes, END).unwrap();
        flow.edge(&no, END).unwrap();
        let err = check_flow(&flow.build()).unwrap_err();
        // Two END edges is still a violation; fanout is not.
        assert!(!err
            .violations
            .iter()
            .any(|v| matches!(v, FlowViolation::BranchFanout { .. })));
    }

    #[test]
    fn test_sub_flow_scope_path_in_violations() {
        let mut flow = FlowBuilder::new("outer");
        let looped = flow
            .loop_while(LoopNode::new("true"), |body| {
                // Body node without START/END wiring.
                body.timer(TimerNode::delay_ms(10))?;
                Ok(())
            })
            .unwrap();
        flow.sequence([START, looped.endpoint(), END]).unwrap();
        let err = check_flow(&flow.build()).unwrap_err();
        assert!(err.violations.contains(&FlowViolation::MissingStartEdge {
            scope: "outer/loop_1".into()
        }));
    }
}
