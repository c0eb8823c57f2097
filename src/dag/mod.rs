//! Dependency-ordered step sequences
//!
//! A [`WorkflowDefinition`] lists steps with the steps they require. The
//! [`DagManager`] layers each registered workflow into waves: every step of a
//! wave may run concurrently, and a wave only depends on earlier waves.
//! Reverting walks the same waves backwards.

pub mod definition;
pub mod manager;
pub mod runner;
pub mod sequences;

pub use definition::{StepDefinition, StepName, WorkflowDefinition, WorkflowFile, WorkflowName};
pub use manager::DagManager;
pub use runner::{Direction, RunOutcome, WaveRunReport, WaveRunner};
pub use sequences::{compute_step_sequences, DagStepSequences, Wave};
