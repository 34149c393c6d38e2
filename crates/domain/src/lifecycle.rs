use serde::{Deserialize, Serialize};

/// Life-cycle state shared by every station service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Constructed, nothing loaded
    #[default]
    Created,
    /// Tables loaded and dependencies verified
    Initialized,
    /// Background work active, operations accepted
    Running,
    /// Stopped cleanly; must be re-initialized before starting again
    Stopped,
    /// Initialization or start failed
    Failed,
}

impl ServiceState {
    pub fn can_initialize(&self) -> bool {
        matches!(self, Self::Created | Self::Stopped | Self::Failed)
    }

    pub fn can_start(&self) -> bool {
        matches!(self, Self::Initialized)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn to_initialized(&self) -> Result<Self, &'static str> {
        if self.can_initialize() {
            Ok(Self::Initialized)
        } else {
            Err("Can only initialize from Created, Stopped or Failed state")
        }
    }

    pub fn to_running(&self) -> Result<Self, &'static str> {
        if self.can_start() {
            Ok(Self::Running)
        } else {
            Err("Can only start from Initialized state")
        }
    }

    pub fn to_stopped(&self) -> Result<Self, &'static str> {
        match self {
            Self::Running | Self::Initialized => Ok(Self::Stopped),
            _ => Err("Can only stop from Running or Initialized state"),
        }
    }

    pub fn to_failed(&self) -> Self {
        Self::Failed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// Coarse health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

/// Health of one service, answerable even when it never reached `Running`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub state: ServiceState,
    pub status: HealthStatus,
    /// Degraded sub-parts and other human-readable notes
    pub details: Vec<String>,
}

impl ServiceHealth {
    /// Health derived from state alone, refined with `details`.
    pub fn from_state(name: impl Into<String>, state: ServiceState, details: Vec<String>) -> Self {
        let status = match state {
            ServiceState::Running if details.is_empty() => HealthStatus::Healthy,
            ServiceState::Running => HealthStatus::Degraded,
            _ => HealthStatus::Down,
        };
        Self {
            name: name.into(),
            state,
            status,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_created() {
        let state = ServiceState::default();
        assert_eq!(state, ServiceState::Created);
        assert!(state.can_initialize());
        assert!(!state.can_start());
        assert!(!state.is_running());
    }

    #[test]
    fn test_happy_path() {
        let state = ServiceState::Created.to_initialized().unwrap();
        let state = state.to_running().unwrap();
        assert!(state.is_running());
        let state = state.to_stopped().unwrap();
        assert_eq!(state, ServiceState::Stopped);
        assert!(state.can_initialize());
    }

    #[test]
    fn test_cannot_start_without_initialize() {
        assert!(ServiceState::Created.to_running().is_err());
        assert!(ServiceState::Stopped.to_running().is_err());
        assert!(ServiceState::Failed.to_running().is_err());
    }

    #[test]
    fn test_cannot_stop_twice() {
        assert!(ServiceState::Stopped.to_stopped().is_err());
        assert!(ServiceState::Created.to_stopped().is_err());
    }

    #[test]
    fn test_cannot_reinitialize_while_running() {
        assert!(ServiceState::Running.to_initialized().is_err());
    }

    #[test]
    fn test_health_from_state() {
        let h = ServiceHealth::from_state("tag-cache", ServiceState::Running, vec![]);
        assert_eq!(h.status, HealthStatus::Healthy);
        let h = ServiceHealth::from_state(
            "tag-cache",
            ServiceState::Running,
            vec!["primary link disconnected".into()],
        );
        assert_eq!(h.status, HealthStatus::Degraded);
        let h = ServiceHealth::from_state("tag-cache", ServiceState::Failed, vec![]);
        assert_eq!(h.status, HealthStatus::Down);
    }
}
