use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use domain::driver::{ConnectionState, HardwareLink, ReadBatch};
use domain::{DomainError, TagValue};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SimulatedConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Initial register contents
    #[serde(default)]
    pub registers: HashMap<String, serde_json::Value>,
    /// JSON object of further initial registers, relative to the config directory
    #[serde(default)]
    pub registers_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Bank {
    registers: HashMap<String, TagValue>,
    connection: ConnectionState,
    failing_reads: u32,
    refuse_connect: bool,
    drop_writes: bool,
    writes: Vec<(String, TagValue)>,
    bulk_reads: u64,
}

/// Shared control surface of a [`SimulatedLink`], usable after the link is boxed
#[derive(Debug, Clone, Default)]
pub struct SimulatedHandle {
    bank: Arc<Mutex<Bank>>,
}

impl SimulatedHandle {
    fn bank(&self) -> std::sync::MutexGuard<'_, Bank> {
        self.bank.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change a register as if the hardware moved on its own
    pub fn set_register(&self, name: &str, value: impl Into<TagValue>) {
        self.bank().registers.insert(name.to_string(), value.into());
    }

    pub fn remove_register(&self, name: &str) {
        self.bank().registers.remove(name);
    }

    pub fn register(&self, name: &str) -> Option<TagValue> {
        self.bank().registers.get(name).cloned()
    }

    /// The next `count` bulk reads fail
    pub fn fail_next_reads(&self, count: u32) {
        self.bank().failing_reads = count;
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.bank().refuse_connect = refuse;
    }

    /// Writes are acknowledged but never reach the registers
    pub fn drop_writes(&self, drop: bool) {
        self.bank().drop_writes = drop;
    }

    /// Simulate a dropped connection; the next poll tick must reconnect
    pub fn sever(&self) {
        self.bank().connection = ConnectionState::Disconnected;
    }

    /// Every acknowledged write in order
    pub fn writes(&self) -> Vec<(String, TagValue)> {
        self.bank().writes.clone()
    }

    pub fn bulk_reads(&self) -> u64 {
        self.bank().bulk_reads
    }
}

/// In-memory register bank speaking the [`HardwareLink`] contract
pub struct SimulatedLink {
    name: String,
    handle: SimulatedHandle,
}

impl SimulatedLink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: SimulatedHandle::default(),
        }
    }

    pub fn with_registers<I, K, V>(name: impl Into<String>, registers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TagValue>,
    {
        let link = Self::new(name);
        {
            let mut bank = link.handle.bank();
            for (k, v) in registers {
                bank.registers.insert(k.into(), v.into());
            }
        }
        link
    }

    pub fn from_config(config: SimulatedConfig) -> Result<Self, DomainError> {
        let mut registers = HashMap::new();
        if let Some(path) = &config.registers_file {
            let text = std::fs::read_to_string(path).map_err(|e| {
                DomainError::Config(format!("Cannot read {}: {e}", path.display()))
            })?;
            let file: HashMap<String, serde_json::Value> = serde_json::from_str(&text)
                .map_err(|e| DomainError::Config(format!("Cannot parse {}: {e}", path.display())))?;
            registers.extend(file);
        }
        registers.extend(config.registers);

        let mut bank = Vec::with_capacity(registers.len());
        for (name, raw) in registers {
            let value = TagValue::from_json(&raw).ok_or_else(|| {
                DomainError::Config(format!("Register {name} must be a scalar, got {raw}"))
            })?;
            bank.push((name, value));
        }
        Ok(Self::with_registers(
            config.name.unwrap_or_else(|| "simulated".to_string()),
            bank,
        ))
    }

    pub fn handle(&self) -> SimulatedHandle {
        self.handle.clone()
    }

    fn ensure_connected(&self, bank: &Bank) -> Result<(), DomainError> {
        if bank.connection.is_connected() {
            Ok(())
        } else {
            Err(DomainError::Hardware(format!("{} is not connected", self.name)))
        }
    }
}

#[async_trait]
impl HardwareLink for SimulatedLink {
    async fn connect(&mut self) -> Result<(), DomainError> {
        let mut bank = self.handle.bank();
        if bank.connection.is_connected() {
            return Ok(());
        }
        let connecting = bank
            .connection
            .to_connecting()
            .map_err(|e| DomainError::Hardware(format!("{}: {e}", self.name)))?;
        if bank.refuse_connect {
            bank.connection = ConnectionState::Failed;
            return Err(DomainError::Hardware(format!("{} refused connection", self.name)));
        }
        bank.connection = connecting
            .to_connected()
            .map_err(|e| DomainError::Hardware(format!("{}: {e}", self.name)))?;
        tracing::info!(link = %self.name, registers = bank.registers.len(), "Simulated link connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DomainError> {
        self.handle.bank().connection = ConnectionState::Disconnected;
        tracing::info!(link = %self.name, "Simulated link disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.bank().connection.is_connected()
    }

    fn connection_state(&self) -> ConnectionState {
        self.handle.bank().connection
    }

    async fn get(&mut self, names: &[String]) -> Result<ReadBatch, DomainError> {
        let mut bank = self.handle.bank();
        self.ensure_connected(&bank)?;
        if bank.failing_reads > 0 {
            bank.failing_reads -= 1;
            return Err(DomainError::Hardware(format!("{}: injected read failure", self.name)));
        }
        bank.bulk_reads += 1;
        Ok(names
            .iter()
            .filter_map(|n| bank.registers.get(n).map(|v| (n.clone(), v.clone())))
            .collect())
    }

    async fn read_tag(&mut self, name: &str) -> Result<TagValue, DomainError> {
        let bank = self.handle.bank();
        self.ensure_connected(&bank)?;
        bank.registers
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::Hardware(format!("{}: no register {name}", self.name)))
    }

    async fn write_tag(&mut self, name: &str, value: TagValue) -> Result<(), DomainError> {
        let mut bank = self.handle.bank();
        self.ensure_connected(&bank)?;
        tracing::debug!(link = %self.name, register = %name, value = %value, "Simulated write");
        bank.writes.push((name.to_string(), value.clone()));
        if !bank.drop_writes {
            bank.registers.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn link_name(&self) -> &str {
        &self.name
    }
}
