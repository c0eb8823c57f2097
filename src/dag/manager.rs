use crate::core::errors::{Result, SchedulerError};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::definition::{WorkflowDefinition, WorkflowFile, WorkflowName};
use super::sequences::{compute_step_sequences, DagStepSequences};

/// Holds named workflow definitions and their cached wave sequences.
///
/// Lifecycle: `register_workflow` any number of times, `setup` once to
/// compute (and validate) every sequence, query with
/// `get_workflow_step_sequences`, then `teardown`.
///
/// Registering a name twice overwrites the earlier definition. After `setup`
/// a registration is validated immediately and rejected if invalid, leaving
/// the previous definition in place.
#[derive(Debug, Default)]
pub struct DagManager {
    workflows: HashMap<WorkflowName, WorkflowDefinition>,
    /// `None` until `setup` succeeds
    sequences: Option<HashMap<WorkflowName, DagStepSequences>>,
}

impl DagManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_workflow(
        &mut self,
        name: impl Into<WorkflowName>,
        workflow_definition: WorkflowDefinition,
    ) -> Result<()> {
        let name = name.into();

        if let Some(sequences) = self.sequences.as_mut() {
            let computed = compute_step_sequences(&name, &workflow_definition)?;
            sequences.insert(name.clone(), computed);
        }

        if self
            .workflows
            .insert(name.clone(), workflow_definition)
            .is_some()
        {
            info!(workflow = %name, "workflow re-registered, previous definition replaced");
        } else {
            debug!(workflow = %name, "workflow registered");
        }
        Ok(())
    }

    /// Register the workflow described by a YAML document, returning its name
    pub fn register_yaml_str(&mut self, yaml: &str) -> Result<WorkflowName> {
        let file = WorkflowFile::from_yaml_str(yaml)?;
        self.register_workflow(file.name.clone(), file.steps)?;
        Ok(file.name)
    }

    pub fn register_yaml_file(&mut self, path: impl AsRef<Path>) -> Result<WorkflowName> {
        let file = WorkflowFile::from_yaml_file(path)?;
        self.register_workflow(file.name.clone(), file.steps)?;
        Ok(file.name)
    }

    /// Compute the wave sequences of every registered workflow.
    ///
    /// Fails on the first invalid workflow; the manager then stays not set up.
    pub fn setup(&mut self) -> Result<()> {
        let mut names: Vec<&WorkflowName> = self.workflows.keys().collect();
        names.sort();

        let mut sequences = HashMap::with_capacity(names.len());
        for name in names {
            let computed = compute_step_sequences(name, &self.workflows[name])?;
            debug!(
                workflow = %name,
                waves = computed.apply.len(),
                steps = computed.step_count(),
                "computed step sequences"
            );
            sequences.insert(name.clone(), computed);
        }

        info!(workflows = sequences.len(), "dag manager set up");
        self.sequences = Some(sequences);
        Ok(())
    }

    /// Drop cached sequences; definitions stay registered
    pub fn teardown(&mut self) {
        if self.sequences.take().is_some() {
            info!("dag manager torn down");
        }
    }

    pub fn is_set_up(&self) -> bool {
        self.sequences.is_some()
    }

    pub fn get_workflow_step_sequences(&self, name: &str) -> Result<DagStepSequences> {
        let sequences = self
            .sequences
            .as_ref()
            .ok_or_else(|| SchedulerError::not_set_up("DagManager"))?;

        sequences
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::WorkflowNotRegistered {
                name: name.to_string(),
                registered: self.registered_workflows(),
            })
    }

    pub fn get_workflow_definition(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(name)
    }

    /// Registered workflow names, sorted
    pub fn registered_workflows(&self) -> Vec<WorkflowName> {
        let mut names: Vec<WorkflowName> = self.workflows.keys().cloned().collect();
        names.sort();
        names
    }
}
