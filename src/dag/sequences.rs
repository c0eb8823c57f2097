use crate::core::errors::{Result, SchedulerError};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::definition::{StepName, WorkflowDefinition};

/// Steps that may run concurrently; iteration order carries no meaning
pub type Wave = BTreeSet<StepName>;

/// Wave-ordered execution plan of a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagStepSequences {
    /// Waves in dependency order: a step's dependencies sit in earlier waves
    pub apply: Vec<Wave>,
    /// `apply` reversed: dependents are reverted before their dependencies
    pub revert: Vec<Wave>,
}

impl DagStepSequences {
    pub fn from_apply(apply: Vec<Wave>) -> Self {
        let revert = apply.iter().rev().cloned().collect();
        Self { apply, revert }
    }

    /// Index of the apply wave holding `step`
    pub fn apply_wave_index(&self, step: &str) -> Option<usize> {
        self.apply.iter().position(|wave| wave.contains(step))
    }

    pub fn revert_wave_index(&self, step: &str) -> Option<usize> {
        self.revert.iter().position(|wave| wave.contains(step))
    }

    pub fn step_count(&self) -> usize {
        self.apply.iter().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.apply.is_empty()
    }
}

/// Build the dependency graph, edges point from a dependency to its dependent
fn build_graph(
    workflow: &str,
    definition: &WorkflowDefinition,
) -> Result<DiGraph<StepName, ()>> {
    let mut graph = DiGraph::<StepName, ()>::with_capacity(definition.len(), 0);
    let mut indices: HashMap<&str, NodeIndex> = HashMap::with_capacity(definition.len());

    for step in definition.steps() {
        if indices.contains_key(step.name.as_str()) {
            return Err(SchedulerError::DuplicateStep {
                workflow: workflow.to_string(),
                step: step.name.clone(),
            });
        }
        indices.insert(step.name.as_str(), graph.add_node(step.name.clone()));
    }

    for step in definition.steps() {
        let step_index = indices[step.name.as_str()];
        for dependency in &step.requires {
            let dependency_index = *indices.get(dependency.as_str()).ok_or_else(|| {
                SchedulerError::UnknownDependency {
                    workflow: workflow.to_string(),
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                }
            })?;
            // update_edge keeps repeated dependencies from inflating in-degrees
            graph.update_edge(dependency_index, step_index, ());
        }
    }

    Ok(graph)
}

/// Layer a workflow into waves (Kahn's algorithm, one wave per round).
///
/// A round that places no step while steps remain means the leftovers sit
/// on or behind a cycle.
pub fn compute_step_sequences(
    workflow: &str,
    definition: &WorkflowDefinition,
) -> Result<DagStepSequences> {
    let graph = build_graph(workflow, definition)?;

    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|idx| {
            (
                idx,
                graph.neighbors_directed(idx, Direction::Incoming).count(),
            )
        })
        .collect();
    let mut remaining: Vec<NodeIndex> = graph.node_indices().collect();
    let mut apply: Vec<Wave> = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<NodeIndex>, Vec<NodeIndex>) = remaining
            .into_iter()
            .partition(|idx| in_degree[idx] == 0);

        if ready.is_empty() {
            let mut stuck: Vec<StepName> = blocked.iter().map(|idx| graph[*idx].clone()).collect();
            stuck.sort();
            return Err(SchedulerError::NotADag {
                workflow: workflow.to_string(),
                remaining: stuck,
            });
        }

        for idx in &ready {
            for dependent in graph.neighbors_directed(*idx, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                }
            }
        }

        apply.push(ready.iter().map(|idx| graph[*idx].clone()).collect());
        remaining = blocked;
    }

    Ok(DagStepSequences::from_apply(apply))
}
