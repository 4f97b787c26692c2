//! Adjacency view of a workflow's steps and edges.

use std::collections::{HashMap, HashSet};

use crate::models::{Edge, EdgeType, Step};

/// Outgoing targets of one step, per edge type, in edge order.
#[derive(Debug, Default, Clone)]
struct Outgoing {
    next: Vec<String>,
    support: Vec<String>,
    callback: Vec<String>,
    failure: Vec<String>,
}

/// Snapshot of a workflow graph taken at the start of a run.
#[derive(Debug, Default)]
pub struct StepGraph {
    steps: HashMap<String, Step>,
    order: Vec<String>,
    outgoing: HashMap<String, Outgoing>,
}

impl StepGraph {
    /// Build the graph. Edges that reference unknown steps are dropped.
    pub fn new(steps: Vec<Step>, edges: &[Edge]) -> Self {
        let order: Vec<String> = steps.iter().map(|s| s.id.clone()).collect();
        let steps: HashMap<String, Step> = steps.into_iter().map(|s| (s.id.clone(), s)).collect();

        let mut outgoing: HashMap<String, Outgoing> = HashMap::new();
        for edge in edges {
            if !steps.contains_key(&edge.from_step_id) || !steps.contains_key(&edge.to_step_id) {
                tracing::warn!(
                    "[Executor] Ignoring edge {} with unknown endpoint",
                    edge.id
                );
                continue;
            }
            let entry = outgoing.entry(edge.from_step_id.clone()).or_default();
            let targets = match edge.edge_type {
                EdgeType::Next => &mut entry.next,
                EdgeType::Support => &mut entry.support,
                EdgeType::Callback => &mut entry.callback,
                EdgeType::Failure => &mut entry.failure,
            };
            targets.push(edge.to_step_id.clone());
        }

        Self {
            steps,
            order,
            outgoing,
        }
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    /// Steps without an incoming `next` edge, in stored order.
    pub fn start_steps(&self) -> Vec<String> {
        let with_incoming: HashSet<&String> = self
            .outgoing
            .values()
            .flat_map(|o| o.next.iter())
            .collect();
        self.order
            .iter()
            .filter(|id| !with_incoming.contains(id))
            .cloned()
            .collect()
    }

    pub fn targets(&self, from: &str, edge_type: EdgeType) -> &[String] {
        let Some(outgoing) = self.outgoing.get(from) else {
            return &[];
        };
        match edge_type {
            EdgeType::Next => &outgoing.next,
            EdgeType::Support => &outgoing.support,
            EdgeType::Callback => &outgoing.callback,
            EdgeType::Failure => &outgoing.failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> Step {
        let mut step = Step::new("wf".into(), name.into(), name.into(), "p".into());
        step.id = name.to_string();
        step
    }

    fn edge(from: &str, to: &str, edge_type: EdgeType) -> Edge {
        Edge::new("wf".into(), from.into(), to.into(), edge_type)
    }

    #[test]
    fn test_start_steps_ignore_non_next_edges() {
        let graph = StepGraph::new(
            vec![step("a"), step("b"), step("c"), step("d")],
            &[
                edge("a", "b", EdgeType::Next),
                edge("a", "c", EdgeType::Support),
                edge("b", "d", EdgeType::Failure),
            ],
        );
        assert_eq!(graph.start_steps(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_targets_keep_edge_order() {
        let graph = StepGraph::new(
            vec![step("a"), step("b"), step("c")],
            &[
                edge("a", "c", EdgeType::Next),
                edge("a", "b", EdgeType::Next),
                edge("a", "b", EdgeType::Callback),
                edge("a", "ghost", EdgeType::Next),
            ],
        );
        assert_eq!(graph.targets("a", EdgeType::Next), ["c", "b"]);
        assert_eq!(graph.targets("a", EdgeType::Callback), ["b"]);
        assert!(graph.targets("a", EdgeType::Failure).is_empty());
        assert!(graph.targets("c", EdgeType::Next).is_empty());
    }

    #[test]
    fn test_cycle_through_next_has_no_start() {
        let graph = StepGraph::new(
            vec![step("a"), step("b")],
            &[edge("a", "b", EdgeType::Next), edge("b", "a", EdgeType::Next)],
        );
        assert!(graph.start_steps().is_empty());
        assert!(graph.step("a").is_some() && graph.step("b").is_some());
    }
}
