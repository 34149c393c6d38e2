use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DomainError, Result};

/// Symbolic tag names the equipment view reads and writes
pub mod tags {
    use super::{FeederId, GasChannel};

    pub fn gas_flow(channel: GasChannel) -> String {
        format!("gas.{}.flow", channel.as_str())
    }

    pub fn gas_setpoint(channel: GasChannel) -> String {
        format!("gas.{}.setpoint", channel.as_str())
    }

    pub fn feeder_running(id: FeederId) -> String {
        format!("feeders.feeder{}.running", id.get())
    }

    pub fn feeder_duty_cycle(id: FeederId) -> String {
        format!("feeders.feeder{}.duty_cycle", id.get())
    }

    pub fn feeder_rate(id: FeederId) -> String {
        format!("feeders.feeder{}.rate", id.get())
    }

    /// Command coil; `running` is the drive's own status bit
    pub fn feeder_enable(id: FeederId) -> String {
        format!("feeders.feeder{}.enable", id.get())
    }

    pub const VACUUM_PRESSURE: &str = "vacuum.pressure";
    pub const VACUUM_PUMP_RUNNING: &str = "vacuum.pump.running";
    pub const VACUUM_PUMP_COMMAND: &str = "vacuum.pump.command";
    pub const NOZZLE_TEMPERATURE: &str = "nozzle.heater.temperature";
    pub const NOZZLE_HEATER_ENABLED: &str = "nozzle.heater.enabled";
}

/// Fact names the equipment view reports
pub mod facts {
    pub const GAS_FLOWING: &str = "gas.flowing";
    pub const VACUUM_READY: &str = "vacuum.ready";
    pub const SPRAY_SAFE: &str = "spray.safe";
}

/// Duty cycle bounds accepted by the feeder drives, in percent
pub const DUTY_CYCLE_RANGE: (f64, f64) = (0.0, 100.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GasChannel {
    Main,
    Carrier,
}

impl GasChannel {
    pub const ALL: [GasChannel; 2] = [GasChannel::Main, GasChannel::Carrier];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Carrier => "carrier",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(Self::Main),
            "carrier" => Ok(Self::Carrier),
            other => Err(DomainError::InvalidCommand(format!(
                "Unknown gas channel '{other}'"
            ))),
        }
    }
}

/// Powder feeder number; the station has exactly two
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FeederId(u8);

impl FeederId {
    pub const ALL: [FeederId; 2] = [FeederId(1), FeederId(2)];

    pub fn new(id: u8) -> Result<Self> {
        match id {
            1 | 2 => Ok(Self(id)),
            _ => Err(DomainError::InvalidCommand(format!(
                "Feeder id must be 1 or 2, got {id}"
            ))),
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GasState {
    pub channel: GasChannel,
    pub flow: f64,
    pub setpoint: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VacuumState {
    pub pressure: f64,
    pub pump_running: bool,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeederState {
    pub id: FeederId,
    pub running: bool,
    pub duty_cycle: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NozzleState {
    pub temperature: f64,
    pub heater_enabled: bool,
}

/// Composed, read-only view of the process equipment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentState {
    pub gas: Vec<GasState>,
    pub gas_flowing: bool,
    pub vacuum: VacuumState,
    pub feeders: Vec<FeederState>,
    pub any_feeder_running: bool,
    pub nozzle: NozzleState,
    pub spray_safe: bool,
    pub timestamp: DateTime<Utc>,
}
