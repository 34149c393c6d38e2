use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::equipment::{
    DUTY_CYCLE_RANGE, EquipmentState, FeederId, FeederState, GasChannel, GasState, NozzleState,
    VacuumState, facts, tags,
};
use domain::{DomainError, Result, ServiceHealth, ServiceState, SnapshotListener};
use tracing::{info, warn};

use crate::cache::TagCache;
use crate::command;
use crate::lifecycle::{Service, StateCell};
use crate::observer::{ListenerId, SnapshotFanout};
use crate::state::StateEngine;

/// Gas, vacuum, feeder and nozzle view over the tag cache and fact table
pub struct EquipmentOrchestrator {
    cell: StateCell,
    cache: Arc<TagCache>,
    engine: Arc<StateEngine>,
    fanout: SnapshotFanout<EquipmentState>,
}

impl EquipmentOrchestrator {
    pub const SERVICE_NAME: &'static str = "equipment";

    pub fn new(cache: Arc<TagCache>, engine: Arc<StateEngine>) -> Self {
        Self {
            cell: StateCell::new(Self::SERVICE_NAME),
            cache,
            engine,
            fanout: SnapshotFanout::new(),
        }
    }

    /// Fresh snapshot; any unreadable constituent fails the whole read
    pub fn get_state(&self) -> Result<EquipmentState> {
        self.cell.ensure_running()?;
        compose(&self.cache, &self.engine)
    }

    pub async fn set_gas_flow(&self, channel: GasChannel, slpm: f64) -> Result<()> {
        self.cell.ensure_running()?;
        let tag = tags::gas_setpoint(channel);
        let slpm = command::finite("gas flow", slpm)?;
        command::within_declared_range(&self.cache, &tag, slpm)?;

        self.cache.set(&tag, slpm).await?;
        info!(channel = channel.as_str(), slpm, "Gas flow setpoint written");
        self.republish();
        Ok(())
    }

    pub async fn set_feeder_duty_cycle(&self, feeder: u8, percent: f64) -> Result<()> {
        self.cell.ensure_running()?;
        let id = FeederId::new(feeder)?;
        let percent = command::finite("duty cycle", percent)?;
        let percent = command::within("duty cycle", percent, DUTY_CYCLE_RANGE)?;
        let tag = tags::feeder_duty_cycle(id);
        command::within_declared_range(&self.cache, &tag, percent)?;

        self.cache.set(&tag, percent).await?;
        info!(feeder, percent, "Feeder duty cycle written");
        self.republish();
        Ok(())
    }

    pub async fn set_feeder_running(&self, feeder: u8, running: bool) -> Result<()> {
        self.cell.ensure_running()?;
        let id = FeederId::new(feeder)?;

        self.cache.set(&tags::feeder_enable(id), running).await?;
        info!(feeder, running, "Feeder command written");
        self.republish();
        Ok(())
    }

    pub async fn set_vacuum_pump(&self, on: bool) -> Result<()> {
        self.cell.ensure_running()?;
        self.cache.set(tags::VACUUM_PUMP_COMMAND, on).await?;
        info!(on, "Vacuum pump command written");
        self.republish();
        Ok(())
    }

    pub async fn set_nozzle_heater(&self, enabled: bool) -> Result<()> {
        self.cell.ensure_running()?;
        self.cache.set(tags::NOZZLE_HEATER_ENABLED, enabled).await?;
        info!(enabled, "Nozzle heater command written");
        self.republish();
        Ok(())
    }

    pub fn on_state_changed(
        &self,
        listener: Arc<dyn SnapshotListener<EquipmentState>>,
    ) -> ListenerId {
        self.fanout.add(listener)
    }

    pub fn remove_listener(&self, id: &ListenerId) -> bool {
        self.fanout.remove(id)
    }

    fn republish(&self) {
        let cache = self.cache.clone();
        let engine = self.engine.clone();
        self.fanout.republish(move || compose(&cache, &engine));
    }
}

fn compose(cache: &TagCache, engine: &StateEngine) -> Result<EquipmentState> {
    let gas = GasChannel::ALL
        .iter()
        .map(|&channel| -> Result<GasState> {
            Ok(GasState {
                channel,
                flow: cache.require_f64(&tags::gas_flow(channel))?,
                setpoint: cache.require_f64(&tags::gas_setpoint(channel))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let feeders = FeederId::ALL
        .iter()
        .map(|&id| -> Result<FeederState> {
            Ok(FeederState {
                id,
                running: cache.require_bool(&tags::feeder_running(id))?,
                duty_cycle: cache.require_f64(&tags::feeder_duty_cycle(id))?,
                rate: cache.require_f64(&tags::feeder_rate(id))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let vacuum = VacuumState {
        pressure: cache.require_f64(tags::VACUUM_PRESSURE)?,
        pump_running: cache.require_bool(tags::VACUUM_PUMP_RUNNING)?,
        ready: engine.get(facts::VACUUM_READY),
    };

    let nozzle = NozzleState {
        temperature: cache.require_f64(tags::NOZZLE_TEMPERATURE)?,
        heater_enabled: cache.require_bool(tags::NOZZLE_HEATER_ENABLED)?,
    };

    let any_feeder_running = feeders.iter().any(|f| f.running);
    Ok(EquipmentState {
        gas,
        gas_flowing: engine.get(facts::GAS_FLOWING),
        vacuum,
        feeders,
        any_feeder_running,
        nozzle,
        spray_safe: engine.get(facts::SPRAY_SAFE),
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl Service for EquipmentOrchestrator {
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
        if !self.engine.is_running() {
            warn!("State engine not running, equipment facts will read false");
        }
        self.cell.mark_initialized()
    }

    async fn start(&self) -> Result<()> {
        self.cell.check_can_start()?;
        self.cell.mark_running()?;
        info!("🏭 Equipment orchestrator running");
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
