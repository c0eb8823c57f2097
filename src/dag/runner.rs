//! Wave-by-wave execution of a workflow's step sequences
//!
//! Steps of one wave run concurrently (bounded by a semaphore, each under a
//! timeout); a wave only starts once every step of the previous wave is done.

use crate::core::config::SchedulerConfig;
use crate::core::errors::{Result, SchedulerError};
use crate::step::{run_attempts, PartialState, PlayContext, Step, StepRegistry};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::definition::StepName;
use super::manager::DagManager;
use super::sequences::{DagStepSequences, Wave};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Revert,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("apply"),
            Self::Revert => f.write_str("revert"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every wave completed
    Completed,
    /// A wave failed; started steps were reverted
    Reverted,
    /// A wave failed and some of the started steps could not be reverted
    RevertFailed,
    /// A wave failed and nothing was reverted
    Failed,
}

/// What happened during a run
#[derive(Debug, Clone)]
pub struct WaveRunReport {
    pub direction: Direction,
    pub outcome: RunOutcome,
    /// Steps that finished successfully, wave by wave
    pub completed: Vec<Wave>,
    /// Failed steps with the error message
    pub failed: Vec<(StepName, String)>,
    /// Steps reverted after a failed apply
    pub reverted: Vec<StepName>,
    /// Revert failures; these do not stop the remaining reverts
    pub revert_failures: Vec<(StepName, String)>,
}

impl WaveRunReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            outcome: RunOutcome::Completed,
            completed: Vec::new(),
            failed: Vec::new(),
            reverted: Vec::new(),
            revert_failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

struct WaveResult {
    succeeded: Vec<(StepName, PartialState)>,
    failed: Vec<(StepName, SchedulerError)>,
}

/// Executes [`DagStepSequences`] against a [`PlayContext`]
pub struct WaveRunner {
    registry: StepRegistry,
    max_parallel_steps: usize,
    step_timeout: Option<Duration>,
    revert_on_failure: bool,
}

impl WaveRunner {
    pub fn new(registry: StepRegistry, config: &SchedulerConfig) -> Self {
        Self {
            registry,
            max_parallel_steps: config
                .max_parallel_steps
                .clamp(1, Semaphore::MAX_PERMITS),
            step_timeout: config.step_timeout(),
            revert_on_failure: config.revert_on_failure,
        }
    }

    /// Apply the named workflow of a set-up manager
    pub async fn run_workflow(
        &self,
        manager: &DagManager,
        name: &str,
        ctx: &PlayContext,
    ) -> Result<WaveRunReport> {
        let sequences = manager.get_workflow_step_sequences(name)?;
        info!(workflow = %name, waves = sequences.apply.len(), "applying workflow");
        self.apply(&sequences, ctx).await
    }

    /// Revert the named workflow of a set-up manager
    pub async fn revert_workflow(
        &self,
        manager: &DagManager,
        name: &str,
        ctx: &PlayContext,
    ) -> Result<WaveRunReport> {
        let sequences = manager.get_workflow_step_sequences(name)?;
        info!(workflow = %name, waves = sequences.revert.len(), "reverting workflow");
        self.revert(&sequences, ctx).await
    }

    /// Run the apply waves in order.
    ///
    /// Step failures are reported, not returned as errors. Unregistered steps
    /// are rejected before anything runs.
    pub async fn apply(
        &self,
        sequences: &DagStepSequences,
        ctx: &PlayContext,
    ) -> Result<WaveRunReport> {
        let steps = self.resolve(&sequences.apply)?;
        let mut report = WaveRunReport::new(Direction::Apply);
        let mut started: BTreeSet<StepName> = BTreeSet::new();

        for (index, wave) in steps.iter().enumerate() {
            debug!(wave = index, steps = wave.len(), "starting apply wave");
            started.extend(wave.iter().map(|s| s.name().to_string()));

            let result = self.run_wave(wave, ctx, Direction::Apply).await;
            let failed = self.merge(result, ctx, &mut report);
            if !failed {
                continue;
            }

            error!(wave = index, failed = ?report.failed, "apply wave failed");
            if !self.revert_on_failure {
                report.outcome = RunOutcome::Failed;
                return Ok(report);
            }

            let to_revert: Vec<Vec<Arc<dyn Step>>> = self
                .resolve(&sequences.revert)?
                .into_iter()
                .map(|wave| {
                    wave.into_iter()
                        .filter(|s| started.contains(s.name()))
                        .collect::<Vec<_>>()
                })
                .filter(|wave| !wave.is_empty())
                .collect();

            for wave in &to_revert {
                let result = self.run_wave(wave, ctx, Direction::Revert).await;
                self.record_revert(result, ctx, &mut report);
            }
            report.outcome = if report.revert_failures.is_empty() {
                RunOutcome::Reverted
            } else {
                RunOutcome::RevertFailed
            };
            return Ok(report);
        }

        Ok(report)
    }

    /// Run every revert wave in order; failures are recorded and skipped
    pub async fn revert(
        &self,
        sequences: &DagStepSequences,
        ctx: &PlayContext,
    ) -> Result<WaveRunReport> {
        let steps = self.resolve(&sequences.revert)?;
        let mut report = WaveRunReport::new(Direction::Revert);

        for wave in &steps {
            let result = self.run_wave(wave, ctx, Direction::Revert).await;
            self.record_revert(result, ctx, &mut report);
        }
        if !report.revert_failures.is_empty() {
            report.outcome = RunOutcome::Failed;
        }
        Ok(report)
    }

    fn resolve(&self, waves: &[Wave]) -> Result<Vec<Vec<Arc<dyn Step>>>> {
        waves
            .iter()
            .map(|wave| {
                wave.iter()
                    .map(|name| self.registry.get(name))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    /// Merge the outputs of an apply wave, returns whether any step failed
    fn merge(&self, result: WaveResult, ctx: &PlayContext, report: &mut WaveRunReport) -> bool {
        let mut completed = Wave::new();
        for (name, partial) in result.succeeded {
            match ctx.update(partial) {
                Ok(()) => {
                    completed.insert(name);
                }
                Err(e) => {
                    warn!(step = %name, error = %e, "could not store step output");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        for (name, e) in result.failed {
            report.failed.push((name, e.to_string()));
        }
        report.completed.push(completed);
        !report.failed.is_empty()
    }

    fn record_revert(&self, result: WaveResult, ctx: &PlayContext, report: &mut WaveRunReport) {
        for (name, partial) in result.succeeded {
            if let Err(e) = ctx.update(partial) {
                warn!(step = %name, error = %e, "could not store revert output");
            }
            report.reverted.push(name);
        }
        for (name, e) in result.failed {
            // keep going: revert as much as possible
            error!(step = %name, error = %e, "revert failed");
            report.revert_failures.push((name, e.to_string()));
        }
    }

    async fn run_wave(
        &self,
        wave: &[Arc<dyn Step>],
        ctx: &PlayContext,
        direction: Direction,
    ) -> WaveResult {
        let semaphore = Semaphore::new(self.max_parallel_steps);
        let mut running: FuturesUnordered<_> = wave
            .iter()
            .map(|step| {
                let semaphore = &semaphore;
                async move {
                    let outcome = match semaphore.acquire().await {
                        Ok(_permit) => self.run_step(step.as_ref(), ctx, direction).await,
                        Err(e) => Err(SchedulerError::internal(format!("semaphore closed: {e}"))),
                    };
                    (step.name().to_string(), outcome)
                }
            })
            .collect();

        let mut result = WaveResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        while let Some((name, outcome)) = running.next().await {
            match outcome {
                Ok(partial) => result.succeeded.push((name, partial)),
                Err(e) => result.failed.push((name, e)),
            }
        }
        // deterministic merge order
        result.succeeded.sort_by(|a, b| a.0.cmp(&b.0));
        result.failed.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    async fn run_step(
        &self,
        step: &dyn Step,
        ctx: &PlayContext,
        direction: Direction,
    ) -> Result<PartialState> {
        let name = step.name();
        let required = match direction {
            Direction::Apply => step.requires(),
            Direction::Revert => step.revert_requires(),
        };
        if let Some(missing) = ctx.missing(&required).first() {
            return Err(SchedulerError::NotInContext {
                key: missing.to_string(),
            });
        }

        debug!(step = %name, %direction, "running step");
        let operation = format!("{direction} {name}");
        let wait = step.wait_between_attempts();
        match direction {
            Direction::Apply => {
                let retries = step.execute_retries();
                run_attempts(name, &operation, retries, wait, self.step_timeout, move || {
                    step.execute(ctx)
                })
                .await
            }
            Direction::Revert => {
                let retries = step.revert_retries();
                run_attempts(name, &operation, retries, wait, self.step_timeout, move || {
                    step.revert(ctx)
                })
                .await
            }
        }
    }
}
