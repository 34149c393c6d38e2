use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::motion::{Axis, AxisState, MotionState, facts, tags};
use domain::{DomainError, Result, ServiceHealth, ServiceState, SnapshotListener};
use tracing::{info, warn};

use crate::cache::TagCache;
use crate::command;
use crate::lifecycle::{Service, StateCell};
use crate::observer::{ListenerId, SnapshotFanout};
use crate::state::StateEngine;

#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    /// Largest accepted jog distance, in axis units
    pub max_jog_step: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self { max_jog_step: 10.0 }
    }
}

/// Axis view and motion commands, gated on `motion.safe_to_move`
pub struct MotionOrchestrator {
    cell: StateCell,
    cache: Arc<TagCache>,
    engine: Arc<StateEngine>,
    config: MotionConfig,
    fanout: SnapshotFanout<MotionState>,
}

impl MotionOrchestrator {
    pub const SERVICE_NAME: &'static str = "motion";

    pub fn new(cache: Arc<TagCache>, engine: Arc<StateEngine>, config: MotionConfig) -> Self {
        Self {
            cell: StateCell::new(Self::SERVICE_NAME),
            cache,
            engine,
            config,
            fanout: SnapshotFanout::new(),
        }
    }

    pub fn get_state(&self) -> Result<MotionState> {
        self.cell.ensure_running()?;
        compose(&self.cache, &self.engine)
    }

    /// Absolute move; writes the speed first so the drive never runs at a stale speed
    pub async fn move_to(&self, axis: Axis, position: f64, speed: f64) -> Result<()> {
        self.cell.ensure_running()?;
        let position = command::finite("position", position)?;
        let speed = command::finite("speed", speed)?;
        if speed <= 0.0 {
            return Err(DomainError::InvalidCommand(format!(
                "Speed must be positive, got {speed}"
            )));
        }
        let target_tag = tags::target(axis);
        let speed_tag = tags::speed(axis);
        command::within_declared_range(&self.cache, &target_tag, position)?;
        command::within_declared_range(&self.cache, &speed_tag, speed)?;
        self.ensure_movable(axis)?;

        self.cache.set(&speed_tag, speed).await?;
        self.cache.set(&target_tag, position).await?;
        info!(axis = axis.as_str(), position, speed, "Move commanded");
        self.republish();
        Ok(())
    }

    pub async fn jog(&self, axis: Axis, step: f64) -> Result<()> {
        self.cell.ensure_running()?;
        let step = command::finite("jog step", step)?;
        if step == 0.0 {
            return Err(DomainError::InvalidCommand("Jog step cannot be zero".to_string()));
        }
        let max = self.config.max_jog_step;
        command::within("jog step", step, (-max, max))?;
        self.ensure_movable(axis)?;

        self.cache.set(&tags::jog(axis), step).await?;
        info!(axis = axis.as_str(), step, "Jog commanded");
        self.republish();
        Ok(())
    }

    pub async fn home(&self, axis: Axis) -> Result<()> {
        self.cell.ensure_running()?;
        self.ensure_movable(axis)?;

        self.cache.set(&tags::home(axis), true).await?;
        info!(axis = axis.as_str(), "Homing commanded");
        self.republish();
        Ok(())
    }

    /// Halt every axis. Always accepted, regardless of safety interlocks; named
    /// apart from [`Service::stop`], which shuts the orchestrator down.
    pub async fn stop_motion(&self) -> Result<()> {
        self.cell.ensure_running()?;
        self.cache.set(tags::STOP, true).await?;
        warn!("⛔ Motion stop commanded");
        self.republish();
        Ok(())
    }

    pub fn on_state_changed(
        &self,
        listener: Arc<dyn SnapshotListener<MotionState>>,
    ) -> ListenerId {
        self.fanout.add(listener)
    }

    pub fn remove_listener(&self, id: &ListenerId) -> bool {
        self.fanout.remove(id)
    }

    fn ensure_movable(&self, axis: Axis) -> Result<()> {
        if !self.engine.get(facts::SAFE_TO_MOVE) {
            return Err(DomainError::InvalidCommand(format!(
                "Motion interlock active ({} is false)",
                facts::SAFE_TO_MOVE
            )));
        }
        if !self.cache.require_bool(&tags::enabled(axis))? {
            return Err(DomainError::InvalidCommand(format!(
                "Axis {} is disabled",
                axis.as_str()
            )));
        }
        Ok(())
    }

    fn republish(&self) {
        let cache = self.cache.clone();
        let engine = self.engine.clone();
        self.fanout.republish(move || compose(&cache, &engine));
    }
}

fn compose(cache: &TagCache, engine: &StateEngine) -> Result<MotionState> {
    let axes = Axis::ALL
        .iter()
        .map(|&axis| -> Result<AxisState> {
            Ok(AxisState {
                axis,
                position: cache.require_f64(&tags::position(axis))?,
                target: cache.require_f64(&tags::target(axis))?,
                speed: cache.require_f64(&tags::speed(axis))?,
                moving: cache.require_bool(&tags::moving(axis))?,
                homed: cache.require_bool(&tags::homed(axis))?,
                enabled: cache.require_bool(&tags::enabled(axis))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MotionState {
        in_motion: axes.iter().any(|a| a.moving),
        all_homed: engine.get(facts::ALL_HOMED),
        axes,
        safe_to_move: engine.get(facts::SAFE_TO_MOVE),
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl Service for MotionOrchestrator {
    fn name(&self) -> &str {
        self.cell.name()
    }

    fn state(&self) -> ServiceState {
        self.cell.get()
    }

    async fn initialize(&self) -> Result<()> {
        self.cell.check_can_initialize()?;
        if !self.cache.is_running() {
            self.cell.mark_failed();
            return Err(DomainError::NotRunning(format!(
                "{} requires a running {}",
                Self::SERVICE_NAME,
                TagCache::SERVICE_NAME
            )));
        }
        if !(self.config.max_jog_step.is_finite() && self.config.max_jog_step > 0.0) {
            self.cell.mark_failed();
            return Err(DomainError::Config(format!(
                "max_jog_step must be positive, got {}",
                self.config.max_jog_step
            )));
        }
        self.cell.mark_initialized()
    }

    async fn start(&self) -> Result<()> {
        self.cell.check_can_start()?;
        self.cell.mark_running()?;
        info!(max_jog_step = self.config.max_jog_step, "🦾 Motion orchestrator running");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cell.check_can_stop()?;
        self.fanout.clear();
        self.cell.mark_stopped()
    }

    fn health(&self) -> ServiceHealth {
        let mut details = Vec::new();
        if self.cell.is_running() {
            if let Err(e) = compose(&self.cache, &self.engine) {
                details.push(format!("snapshot unavailable: {e}"));
            }
        }
        ServiceHealth::from_state(self.name(), self.cell.get(), details)
    }
}
