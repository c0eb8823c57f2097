use crate::core::errors::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of one component of a dynamic service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Absent,
    Starting,
    Running,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "ABSENT",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize)]
struct RawServicesPresence {
    #[serde(default)]
    legacy: Option<ServiceState>,
    #[serde(default)]
    dy_sidecar: Option<ServiceState>,
    #[serde(default)]
    dy_proxy: Option<ServiceState>,
}

/// Which components of a dynamic service were observed.
///
/// A service reports either through the single `legacy` component or through
/// the `dy_sidecar` + `dy_proxy` pair, never both. Construction and
/// deserialization reject a mix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawServicesPresence")]
pub struct ServicesPresence {
    legacy: Option<ServiceState>,
    dy_sidecar: Option<ServiceState>,
    dy_proxy: Option<ServiceState>,
}

impl ServicesPresence {
    pub fn new(
        legacy: Option<ServiceState>,
        dy_sidecar: Option<ServiceState>,
        dy_proxy: Option<ServiceState>,
    ) -> Result<Self> {
        if legacy.is_some() && (dy_sidecar.is_some() || dy_proxy.is_some()) {
            return Err(SchedulerError::validation_field(
                format!(
                    "Cannot have both legacy and new-style services present \
                     (legacy={legacy:?}, dy_sidecar={dy_sidecar:?}, dy_proxy={dy_proxy:?})"
                ),
                "legacy",
            ));
        }
        Ok(Self {
            legacy,
            dy_sidecar,
            dy_proxy,
        })
    }

    pub fn legacy(state: ServiceState) -> Self {
        Self {
            legacy: Some(state),
            ..Self::default()
        }
    }

    pub fn new_style(dy_sidecar: Option<ServiceState>, dy_proxy: Option<ServiceState>) -> Self {
        Self {
            legacy: None,
            dy_sidecar,
            dy_proxy,
        }
    }

    pub fn legacy_state(&self) -> Option<ServiceState> {
        self.legacy
    }

    pub fn dy_sidecar(&self) -> Option<ServiceState> {
        self.dy_sidecar
    }

    pub fn dy_proxy(&self) -> Option<ServiceState> {
        self.dy_proxy
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy.is_some()
    }

    /// Nothing observed at all
    pub fn is_empty(&self) -> bool {
        self.legacy.is_none() && self.dy_sidecar.is_none() && self.dy_proxy.is_none()
    }

    /// Single state summarising the service.
    ///
    /// New-style: any `Failed` wins, both `Running` is `Running`, any
    /// component starting or running is `Starting`, otherwise `Absent`.
    pub fn overall_state(&self) -> Option<ServiceState> {
        if let Some(legacy) = self.legacy {
            return Some(legacy);
        }
        if self.is_empty() {
            return None;
        }

        let states = [self.dy_sidecar, self.dy_proxy];
        if states.contains(&Some(ServiceState::Failed)) {
            return Some(ServiceState::Failed);
        }
        if states.iter().all(|s| *s == Some(ServiceState::Running)) {
            return Some(ServiceState::Running);
        }
        if states
            .iter()
            .any(|s| matches!(s, Some(ServiceState::Starting | ServiceState::Running)))
        {
            return Some(ServiceState::Starting);
        }
        Some(ServiceState::Absent)
    }
}

impl TryFrom<RawServicesPresence> for ServicesPresence {
    type Error = SchedulerError;

    fn try_from(raw: RawServicesPresence) -> Result<Self> {
        Self::new(raw.legacy, raw.dy_sidecar, raw.dy_proxy)
    }
}
