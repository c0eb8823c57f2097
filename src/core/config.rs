use crate::core::errors::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of the human readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Scheduler configuration with all tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    // Wave execution
    /// Maximum number of steps of one wave running at the same time
    pub max_parallel_steps: usize,
    /// Timeout applied to each step execute/revert attempt, in milliseconds
    pub step_timeout_ms: Option<u64>,
    /// Revert the started steps when an apply wave fails
    pub revert_on_failure: bool,
    /// Upper bound on scene transitions in a single play run
    pub max_scene_transitions: usize,

    // Service tracker
    /// Prefix of the storage keys of tracked services
    pub tracker_key_prefix: String,
    /// Default delay before the next status check of a service, in milliseconds
    pub check_status_interval_ms: u64,
    /// Database path for the persistent store
    pub storage_path: Option<PathBuf>,

    pub logging: LoggingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: 10,
            step_timeout_ms: Some(300_000), // 5 minutes
            revert_on_failure: true,
            max_scene_transitions: 1_000,

            tracker_key_prefix: "t::".to_string(),
            check_status_interval_ms: 5_000,
            storage_path: None,

            logging: LoggingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a new builder for SchedulerConfig
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }

    /// Configuration suited to tests and local development
    pub fn development() -> Self {
        Self {
            max_parallel_steps: 4,
            step_timeout_ms: Some(30_000),
            check_status_interval_ms: 1_000,
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
            ..Default::default()
        }
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }

    pub fn check_status_interval(&self) -> Duration {
        Duration::from_millis(self.check_status_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_steps == 0 {
            return Err(SchedulerError::configuration_field(
                "max_parallel_steps must be greater than 0",
                "max_parallel_steps",
            ));
        }
        if self.max_parallel_steps > Semaphore::MAX_PERMITS {
            return Err(SchedulerError::configuration_field(
                format!(
                    "max_parallel_steps cannot exceed {}",
                    Semaphore::MAX_PERMITS
                ),
                "max_parallel_steps",
            ));
        }
        if self.step_timeout_ms == Some(0) {
            return Err(SchedulerError::configuration_field(
                "step_timeout_ms must be greater than 0 when set",
                "step_timeout_ms",
            ));
        }
        if self.max_scene_transitions == 0 {
            return Err(SchedulerError::configuration_field(
                "max_scene_transitions must be greater than 0",
                "max_scene_transitions",
            ));
        }
        if self.tracker_key_prefix.is_empty() {
            return Err(SchedulerError::configuration_field(
                "tracker_key_prefix cannot be empty",
                "tracker_key_prefix",
            ));
        }
        if !self.tracker_key_prefix.ends_with("::") {
            return Err(SchedulerError::configuration_field(
                format!(
                    "tracker_key_prefix '{}' must end with '::'",
                    self.tracker_key_prefix
                ),
                "tracker_key_prefix",
            ));
        }
        if self.tracker_key_prefix.contains('*') {
            return Err(SchedulerError::configuration_field(
                "tracker_key_prefix cannot contain '*'",
                "tracker_key_prefix",
            ));
        }
        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::io(format!("read {}", path.display()), e))?;
        Self::from_yaml_str(&content)
    }
}

/// Builder for SchedulerConfig
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
        }
    }

    pub fn max_parallel_steps(mut self, max_parallel_steps: usize) -> Self {
        self.config.max_parallel_steps = max_parallel_steps;
        self
    }

    pub fn step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.step_timeout_ms = timeout.map(millis);
        self
    }

    pub fn revert_on_failure(mut self, enabled: bool) -> Self {
        self.config.revert_on_failure = enabled;
        self
    }

    pub fn max_scene_transitions(mut self, max: usize) -> Self {
        self.config.max_scene_transitions = max;
        self
    }

    pub fn tracker_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.tracker_key_prefix = prefix.into();
        self
    }

    pub fn check_status_interval(mut self, interval: Duration) -> Self {
        self.config.check_status_interval_ms = millis(interval);
        self
    }

    /// Set database path
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = Some(path.into());
        self
    }

    pub fn logging(mut self, level: impl Into<String>, json: bool) -> Self {
        self.config.logging = LoggingConfig {
            level: level.into(),
            json,
        };
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<SchedulerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
