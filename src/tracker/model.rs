use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::presence::ServicesPresence;

/// Identifier of a dynamic service instance
pub type NodeId = Uuid;

/// What the user asked the service to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRequestedState {
    Running,
    Stopped,
}

/// What the scheduler believes the service currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerServiceState {
    Running,
    Idle,
    Starting,
    Stopping,
    UnexpectedOutcome,
    #[default]
    Unknown,
}

impl fmt::Display for SchedulerServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Idle => "IDLE",
            Self::Starting => "STARTING",
            Self::Stopping => "STOPPING",
            Self::UnexpectedOutcome => "UNEXPECTED_OUTCOME",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Persisted state of one tracked dynamic service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedServiceModel {
    /// Desired run state; older records spell it `requested_sate`
    #[serde(alias = "requested_sate")]
    pub requested_state: UserRequestedState,

    #[serde(default)]
    pub current_state: SchedulerServiceState,
    /// Last time `current_state` changed
    pub last_state_change: DateTime<Utc>,

    /// Last status payload reported for the service, stored opaque
    #[serde(default)]
    pub service_status: Option<serde_json::Value>,
    #[serde(default)]
    pub service_status_task_uid: Option<String>,
    /// Status is not checked again before this instant
    #[serde(default)]
    pub check_status_after: Option<DateTime<Utc>>,

    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub project_id: Option<Uuid>,

    #[serde(default)]
    pub services_presence: ServicesPresence,
}

impl TrackedServiceModel {
    pub fn new(requested_state: UserRequestedState) -> Self {
        Self {
            requested_state,
            current_state: SchedulerServiceState::Unknown,
            last_state_change: Utc::now(),
            service_status: None,
            service_status_task_uid: None,
            check_status_after: None,
            user_id: None,
            project_id: None,
            services_presence: ServicesPresence::default(),
        }
    }

    pub fn with_owner(mut self, user_id: u64, project_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self.project_id = Some(project_id);
        self
    }

    /// Whether the status is due for a check at `now`
    pub fn status_check_due(&self, now: DateTime<Utc>) -> bool {
        self.check_status_after.map_or(true, |after| now >= after)
    }
}
