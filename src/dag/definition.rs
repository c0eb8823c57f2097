use crate::core::errors::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type StepName = String;
pub type WorkflowName = String;

/// A step and the steps it requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: StepName,
    /// Steps that must complete before this one runs
    #[serde(default)]
    pub requires: Vec<StepName>,
}

/// Ordered `(step, requires)` pairs describing a workflow's dependency graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowDefinition {
    steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a definition from `(name, requires)` pairs
    pub fn from_pairs<I, S, R, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, R)>,
        S: Into<StepName>,
        R: IntoIterator<Item = D>,
        D: Into<StepName>,
    {
        Self {
            steps: pairs
                .into_iter()
                .map(|(name, requires)| StepDefinition {
                    name: name.into(),
                    requires: requires.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }
    }

    /// Append a step
    pub fn step(mut self, name: impl Into<StepName>, requires: &[&str]) -> Self {
        self.steps.push(StepDefinition {
            name: name.into(),
            requires: requires.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A named workflow as written in a YAML file:
///
/// ```yaml
/// name: start_service
/// steps:
///   - name: pull_images
///   - name: create_sidecar
///     requires: [pull_images]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub name: WorkflowName,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: WorkflowDefinition,
}

impl WorkflowFile {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::io(format!("read {}", path.display()), e))?;
        Self::from_yaml_str(&content)
    }
}
