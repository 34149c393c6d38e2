use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use domain::{DomainError, Result, ServiceHealth, ServiceState};

/// Life-cycle contract shared by every station service.
///
/// Services are shared behind `Arc`, so transitions take `&self` and keep
/// their state behind a [`StateCell`].
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> ServiceState;

    fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Load tables and verify dependencies
    async fn initialize(&self) -> Result<()>;

    /// Spawn background work and begin accepting operations
    async fn start(&self) -> Result<()>;

    /// Not idempotent: fails with `NotRunning` unless the service is running
    async fn stop(&self) -> Result<()>;

    fn health(&self) -> ServiceHealth;
}

/// Lock-guarded [`ServiceState`] with the transition checks every service repeats
#[derive(Debug)]
pub struct StateCell {
    name: String,
    state: RwLock<ServiceState>,
}

impl StateCell {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ServiceState::Created),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> ServiceState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.get().is_running()
    }

    pub fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(DomainError::NotRunning(format!(
                "{} is {}",
                self.name,
                self.get().as_str()
            )))
        }
    }

    /// Fails unless the current state allows `initialize`
    pub fn check_can_initialize(&self) -> Result<()> {
        self.get()
            .to_initialized()
            .map(|_| ())
            .map_err(|e| self.illegal(e))
    }

    pub fn mark_initialized(&self) -> Result<()> {
        self.apply(|s| s.to_initialized())
    }

    pub fn check_can_start(&self) -> Result<()> {
        self.get().to_running().map(|_| ()).map_err(|e| self.illegal(e))
    }

    pub fn mark_running(&self) -> Result<()> {
        self.apply(|s| s.to_running())
    }

    /// Stopping anything but a running service is a caller error
    pub fn check_can_stop(&self) -> Result<()> {
        self.ensure_running()
    }

    pub fn mark_stopped(&self) -> Result<()> {
        self.apply(|s| s.to_stopped())
    }

    pub fn mark_failed(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = state.to_failed();
    }

    fn apply(
        &self,
        transition: impl FnOnce(&ServiceState) -> std::result::Result<ServiceState, &'static str>,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = transition(&state).map_err(|e| self.illegal(e))?;
        Ok(())
    }

    fn illegal(&self, reason: &str) -> DomainError {
        DomainError::InvalidCommand(format!("{}: {}", self.name, reason))
    }
}
