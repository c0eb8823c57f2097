//! Scheduling core for dynamic services
//!
//! * [`dag`]: workflows of dependent steps, layered into apply/revert waves
//! * [`play`]: scenes with success/error routing, validated as a catalog
//! * [`tracker`]: per-service state records behind a key-value store
//! * [`step`]: the step trait, its registry and the shared context

// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
    pub mod logging;
}

pub mod dag;     // Wave-ordered workflows
pub mod play;    // Scene routing
pub mod step;    // Steps and their context
pub mod tracker; // Service lifecycle tracking

// Re-exports for convenience
pub use crate::core::config::{LoggingConfig, SchedulerConfig, SchedulerConfigBuilder};
pub use crate::core::errors::{Result, SchedulerError, ValueKind};
pub use crate::core::logging::init_tracing;

pub use dag::{
    compute_step_sequences, DagManager, DagStepSequences, WaveRunReport, WaveRunner, Wave,
    WorkflowDefinition,
};
pub use play::{PlayCatalog, PlayManager, PlayRunner, PlayTracker, Scene};
pub use step::{partial_state, FnStep, PartialState, PlayContext, Step, StepRegistry};
pub use tracker::{
    InMemoryStore, KeyValueStore, NodeId, ServiceState, ServiceTracker, ServicesPresence,
    SledStore, TrackedServiceModel,
};
