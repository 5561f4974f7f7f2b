// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graph validation and topological wave batching over a [`Workflow`]'s
//! step table, built on `petgraph`.

use crate::error::{Error, Result};
use crate::workflow::Workflow;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// Validates a workflow's step graph: every dependency must name a step
/// that exists, and the graph must be acyclic. Calling this twice on the
/// same workflow yields the same verdict.
pub fn validate(workflow: &Workflow) -> Result<()> {
    for step in workflow.steps() {
        for dep in &step.dependencies {
            if !workflow.contains_step(dep) {
                return Err(Error::unknown_dependency(format!(
                    "step '{}' depends on unknown step '{dep}'",
                    step.id
                )));
            }
        }
    }

    let graph = build_graph(workflow);
    if petgraph::algo::is_cyclic_directed(&graph) {
        return Err(Error::cyclic_graph(
            "workflow step graph contains a dependency cycle",
        ));
    }

    Ok(())
}

/// Builds a petgraph `DiGraph` with an edge from each dependency to its
/// dependent, so that a topological order runs dependencies first.
fn build_graph(workflow: &Workflow) -> DiGraph<String, ()> {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for step in workflow.steps() {
        let node = graph.add_node(step.id.clone());
        nodes.insert(step.id.as_str(), node);
    }

    for step in workflow.steps() {
        let Some(&dependent) = nodes.get(step.id.as_str()) else {
            continue;
        };
        for dep in &step.dependencies {
            if let Some(&dependency) = nodes.get(dep.as_str()) {
                graph.add_edge(dependency, dependent, ());
            }
        }
    }

    graph
}

/// Computes waves: each wave is the set of step ids whose dependencies are
/// all in an earlier wave. Steps within a wave preserve the workflow's
/// insertion order.
pub fn topological_waves(workflow: &Workflow) -> Vec<Vec<String>> {
    let graph = build_graph(workflow);
    let mut remaining_in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.edges_directed(n, Direction::Incoming).count()))
        .collect();

    let mut waves = Vec::new();
    let mut settled = vec![false; graph.node_count()];
    let total = graph.node_count();
    let mut settled_count = 0;

    while settled_count < total {
        let mut wave: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|n| !settled[n.index()] && remaining_in_degree[n] == 0)
            .collect();

        if wave.is_empty() {
            // Should never happen once `validate` has rejected cycles; bail
            // out rather than loop forever.
            break;
        }

        // Preserve insertion order within the wave using the workflow's
        // step ordering rather than petgraph's internal node order.
        wave.sort_by_key(|n| workflow.step_index(&graph[*n]).unwrap_or(usize::MAX));

        let wave_ids: Vec<String> = wave.iter().map(|n| graph[*n].clone()).collect();

        for &node in &wave {
            settled[node.index()] = true;
            settled_count += 1;
            for edge in graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target();
                if let Some(count) = remaining_in_degree.get_mut(&target) {
                    *count = count.saturating_sub(1);
                }
            }
        }

        waves.push(wave_ids);
    }

    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentConfig, AgentVariant};
    use crate::client::ModelClient;
    use crate::model::TransportRegistry;
    use crate::workflow::ExecutionPolicy;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Arc;

    fn test_agent() -> Arc<Agent> {
        let client = Arc::new(ModelClient::new(TransportRegistry::new()));
        Arc::new(Agent::new(
            "a1",
            "test-agent",
            AgentConfig::default(),
            AgentVariant::Simple,
            "prompt",
            client,
        ))
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("a", test_agent(), StdHashMap::new(), ["missing".to_string()])
            .unwrap();

        let err = validate(&workflow).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnknownDependency);
    }

    #[test]
    fn self_dependency_is_cyclic() {
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("a", test_agent(), StdHashMap::new(), ["a".to_string()])
            .unwrap();

        let err = validate(&workflow).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CyclicGraph);
    }

    #[test]
    fn two_step_cycle_is_rejected() {
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("a", test_agent(), StdHashMap::new(), ["b".to_string()])
            .unwrap();
        workflow
            .add_step("b", test_agent(), StdHashMap::new(), ["a".to_string()])
            .unwrap();

        let err = validate(&workflow).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CyclicGraph);
    }

    #[test]
    fn validation_is_idempotent() {
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("a", test_agent(), StdHashMap::new(), [])
            .unwrap();

        assert!(validate(&workflow).is_ok());
        assert!(validate(&workflow).is_ok());
    }

    #[test]
    fn waves_group_independent_steps_and_order_dependents_after() {
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow.add_step("x", test_agent(), StdHashMap::new(), []).unwrap();
        workflow.add_step("y", test_agent(), StdHashMap::new(), []).unwrap();
        workflow
            .add_step("z", test_agent(), StdHashMap::new(), ["x".to_string(), "y".to_string()])
            .unwrap();

        let waves = topological_waves(&workflow);
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0], vec!["x".to_string(), "y".to_string()]);
        assert_eq!(waves[1], vec!["z".to_string()]);
    }

    #[test]
    fn empty_workflow_has_no_waves() {
        let workflow = Workflow::new("wf", ExecutionPolicy::default());
        assert!(topological_waves(&workflow).is_empty());
    }
}
