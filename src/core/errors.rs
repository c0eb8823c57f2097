use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the scheduler core
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The dependency graph of a workflow contains a cycle
    #[error("Workflow '{workflow}' is not a DAG: steps {remaining:?} have circular dependencies")]
    NotADag {
        workflow: String,
        remaining: Vec<String>,
    },

    /// A step depends on a name that is not a step of the same workflow
    #[error("Workflow '{workflow}': dependency '{dependency}' of step '{step}' not found")]
    UnknownDependency {
        workflow: String,
        step: String,
        dependency: String,
    },

    /// The same step name appears twice in one workflow
    #[error("Workflow '{workflow}': step '{step}' is defined more than once")]
    DuplicateStep { workflow: String, step: String },

    #[error("Workflow '{name}' is not registered (registered: {registered:?})")]
    WorkflowNotRegistered {
        name: String,
        registered: Vec<String>,
    },

    /// Step sequences were requested before `setup()` was called
    #[error("{component} was not set up, call setup() first")]
    NotSetUp { component: String },

    #[error("Scene '{scene}' requires next scene '{next_scene}' which is not in the play catalog")]
    NextSceneNotInPlayCatalog { scene: String, next_scene: String },

    #[error(
        "Scene '{scene}' requires on error scene '{on_error_scene}' which is not in the play catalog"
    )]
    OnErrorSceneNotInPlayCatalog {
        scene: String,
        on_error_scene: String,
    },

    #[error("Scene '{name}' is already part of the play catalog")]
    DuplicateScene { name: String },

    #[error("Scene '{name}' not found in play catalog")]
    SceneNotFound { name: String },

    #[error("Step '{step}' is not registered")]
    StepNotRegistered { step: String },

    /// A play kept moving between scenes past the configured bound
    #[error("Play '{play}' exceeded {limit} scene transitions")]
    SceneTransitionLimit { play: String, limit: usize },

    #[error("Play '{play}' is already running")]
    PlayAlreadyRunning { play: String },

    #[error("Play '{play}' is not running")]
    PlayNotRunning { play: String },

    /// The task running a play was cancelled before it finished
    #[error("Play '{play}' was cancelled")]
    PlayCancelled { play: String },

    /// Validation errors (malformed payloads, contradictory fields)
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    #[error("Could not find a variable named '{key}' in context")]
    NotInContext { key: String },

    #[error(
        "Found a variable named '{key}' of type '{existing_type}', trying to set it to type '{new_type}'"
    )]
    SetTypeMismatch {
        key: String,
        existing_type: ValueKind,
        new_type: ValueKind,
    },

    #[error("Found a variable named '{key}' of type '{existing_type}', expecting {expected_type}: {reason}")]
    GetTypeMismatch {
        key: String,
        existing_type: ValueKind,
        expected_type: String,
        reason: String,
    },

    /// A step body returned an error
    #[error("Step '{step}' failed: {message}")]
    StepFailed {
        step: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Timeout errors
    #[error("Operation timed out: {operation} (timeout: {timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Key-value backend errors
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// JSON kind of a context value, used to keep context keys type-stable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(_) => Self::Bool,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

impl SchedulerError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error with field
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn not_set_up<S: Into<String>>(component: S) -> Self {
        Self::NotSetUp {
            component: component.into(),
        }
    }

    /// Wrap the error returned by a step body
    pub fn step_failed<S: Into<String>>(step: S, source: anyhow::Error) -> Self {
        Self::StepFailed {
            step: step.into(),
            message: format!("{source:#}"),
            source: Some(source.into()),
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        operation: S,
        source: E,
    ) -> Self {
        Self::Database {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Timeout error for an elapsed `limit`, saturating at `u64::MAX` ms
    pub fn timeout_after<S: Into<String>>(operation: S, limit: Duration) -> Self {
        Self::timeout(
            operation,
            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        )
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if error is recoverable
    ///
    /// Graph-definition errors are never recoverable: the orchestrator
    /// must refuse to start.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Io { .. } | Self::Database { .. } => true,
            Self::StepFailed { .. } => true,
            Self::SceneNotFound { .. }
            | Self::WorkflowNotRegistered { .. }
            | Self::Validation { .. } => true,
            Self::PlayAlreadyRunning { .. } | Self::PlayCancelled { .. } => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotADag { .. }
            | Self::UnknownDependency { .. }
            | Self::DuplicateStep { .. }
            | Self::NextSceneNotInPlayCatalog { .. }
            | Self::OnErrorSceneNotInPlayCatalog { .. }
            | Self::DuplicateScene { .. } => "graph_definition",
            Self::WorkflowNotRegistered { .. }
            | Self::NotSetUp { .. }
            | Self::SceneNotFound { .. }
            | Self::StepNotRegistered { .. } => "lookup",
            Self::Validation { .. } => "validation",
            Self::Configuration { .. } => "configuration",
            Self::NotInContext { .. }
            | Self::SetTypeMismatch { .. }
            | Self::GetTypeMismatch { .. } => "context",
            Self::StepFailed { .. } | Self::SceneTransitionLimit { .. } => "step",
            Self::PlayAlreadyRunning { .. }
            | Self::PlayNotRunning { .. }
            | Self::PlayCancelled { .. } => "play",
            Self::Timeout { .. } => "timeout",
            Self::Database { .. } => "database",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for SchedulerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<sled::Error> for SchedulerError {
    fn from(err: sled::Error) -> Self {
        Self::database("sled_operation", err)
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}
