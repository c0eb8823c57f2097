//! Name-keyed registry of steps

use crate::core::errors::{Result, SchedulerError};
use dashmap::DashMap;
use std::sync::Arc;

use super::base::Step;

/// Registry for step instances
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: Arc<DashMap<String, Arc<dyn Step>>>,
}

impl StepRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step, replacing any step with the same name
    pub fn register(&self, step: Arc<dyn Step>) {
        tracing::debug!(step = step.name(), "registered step");
        self.steps.insert(step.name().to_string(), step);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Step>> {
        self.steps
            .get(name)
            .map(|s| s.value().clone())
            .ok_or_else(|| SchedulerError::StepNotRegistered {
                step: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// List all registered step names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.steps.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.list())
            .finish()
    }
}
