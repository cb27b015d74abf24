//! Step graph builder, cycle detection, and parallel wave computation.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. Topological
//! sort detects cycles, and depth-based grouping produces parallel execution
//! waves where all steps in a wave can run concurrently.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::steps::{StepDefinition, StepKind};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural errors in a pipeline definition.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Dependency graph contains a cycle.
    #[error("cycle detected involving step '{0}'")]
    CycleDetected(&'static str),

    /// A step references a dependency that is not in the pipeline.
    #[error("step '{0}' depends on unknown step '{1}'")]
    UnknownDependency(&'static str, &'static str),

    /// The same step appears twice in the pipeline.
    #[error("duplicate step '{0}'")]
    DuplicateStep(&'static str),
}

// ---------------------------------------------------------------------------
// Execution plan (wave computation)
// ---------------------------------------------------------------------------

/// Build an execution plan from pipeline steps, grouping them into parallel
/// waves.
///
/// Each wave contains steps whose dependencies are all satisfied by prior
/// waves, so everything within one wave can run concurrently. The algorithm:
///
/// 1. Build a `DiGraph` with dependency -> dependent edges.
/// 2. Run `petgraph::algo::toposort` to verify acyclicity.
/// 3. Compute each node's depth (max dependency depth + 1).
/// 4. Group steps by depth into waves.
pub fn build_execution_plan(
    steps: &[StepDefinition],
) -> Result<Vec<Vec<&StepDefinition>>, EngineError> {
    if steps.is_empty() {
        return Ok(vec![]);
    }

    let index = index_steps(steps)?;
    let graph = build_graph(steps, &index)?;

    let sorted = toposort(&graph, None)
        .map_err(|cycle| EngineError::CycleDetected(graph[cycle.node_id()].as_str()))?;

    // Depth per step: roots are 0, everything else max(dep depth) + 1.
    let mut depths: HashMap<StepKind, usize> = HashMap::new();
    for node_idx in sorted {
        let kind = graph[node_idx];
        let step = &steps[index[&kind]];
        let depth = step
            .depends_on
            .iter()
            .map(|dep| depths.get(dep).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depths.insert(kind, depth);
    }

    let max_depth = depths.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&StepDefinition>> = vec![vec![]; max_depth + 1];
    for step in steps {
        waves[depths[&step.id]].push(step);
    }

    Ok(waves)
}

/// Validate that the pipeline forms a DAG with unique steps and resolvable
/// dependencies, without computing waves.
pub fn validate_pipeline(steps: &[StepDefinition]) -> Result<(), EngineError> {
    let index = index_steps(steps)?;
    let graph = build_graph(steps, &index)?;
    toposort(&graph, None)
        .map_err(|cycle| EngineError::CycleDetected(graph[cycle.node_id()].as_str()))?;
    Ok(())
}

fn index_steps(steps: &[StepDefinition]) -> Result<HashMap<StepKind, usize>, EngineError> {
    let mut index = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if index.insert(step.id, i).is_some() {
            return Err(EngineError::DuplicateStep(step.id.as_str()));
        }
    }
    Ok(index)
}

fn build_graph(
    steps: &[StepDefinition],
    index: &HashMap<StepKind, usize>,
) -> Result<DiGraph<StepKind, ()>, EngineError> {
    let mut graph = DiGraph::<StepKind, ()>::new();
    let nodes: Vec<_> = steps.iter().map(|s| graph.add_node(s.id)).collect();

    for step in steps {
        let to = nodes[index[&step.id]];
        for dep in &step.depends_on {
            let from_idx = index
                .get(dep)
                .ok_or(EngineError::UnknownDependency(step.id.as_str(), dep.as_str()))?;
            graph.add_edge(nodes[*from_idx], to, ());
        }
    }

    Ok(graph)
}

// ---------------------------------------------------------------------------
// Topology description
// ---------------------------------------------------------------------------

/// Node/edge listing of a pipeline, for external renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub nodes: Vec<&'static str>,
    pub edges: Vec<(&'static str, &'static str)>,
}

/// Describe a pipeline's nodes and dependency edges.
pub fn topology(steps: &[StepDefinition]) -> Topology {
    let nodes = steps.iter().map(|s| s.id.as_str()).collect();
    let edges = steps
        .iter()
        .flat_map(|s| s.depends_on.iter().map(|d| (d.as_str(), s.id.as_str())))
        .collect();
    Topology { nodes, edges }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
