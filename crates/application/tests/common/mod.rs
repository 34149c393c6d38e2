#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use application::{CacheConfig, Service, StateEngine, TagCache};
use async_trait::async_trait;
use domain::rule::RawRuleTable;
use domain::tag::RawTagTable;
use domain::{FactListener, ListenerResult, SnapshotListener, TagChange, TagListener, TagValue};
use infrastructure::{SimulatedHandle, SimulatedLink};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Forwards every notification into a channel the test can await
pub struct ChannelListener<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> ChannelListener<T> {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl TagListener for ChannelListener<TagChange> {
    async fn on_tag_changed(&self, change: &TagChange) -> ListenerResult {
        self.tx.send(change.clone())?;
        Ok(())
    }
}

#[async_trait]
impl FactListener for ChannelListener<BTreeMap<String, bool>> {
    async fn on_facts_changed(&self, facts: &BTreeMap<String, bool>) -> ListenerResult {
        self.tx.send(facts.clone())?;
        Ok(())
    }
}

#[async_trait]
impl<S: Clone + std::fmt::Debug + Send + Sync + 'static> SnapshotListener<S> for ChannelListener<S> {
    async fn on_snapshot(&self, snapshot: &S) -> ListenerResult {
        self.tx.send(snapshot.clone())?;
        Ok(())
    }
}

/// Next message within a second, or `None`
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}

/// True when nothing arrives for a short while
pub async fn stays_quiet<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> bool {
    tokio::time::timeout(Duration::from_millis(150), rx.recv())
        .await
        .is_err()
}

/// Polls `condition` until it holds or a second has passed
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn approx(value: Option<TagValue>, expected: f64) -> bool {
    value
        .and_then(|v| v.as_f64())
        .is_some_and(|v| (v - expected).abs() < 0.01)
}

fn dac(physical: &str, access: &str, max: f64) -> Value {
    json!({"physical": physical, "access": access, "scaling": "dac12", "min": 0, "max": max})
}

fn plain(physical: &str, access: &str) -> Value {
    json!({"physical": physical, "access": access, "scaling": "pass_through"})
}

/// A small spray cell: gas, vacuum, two feeders, a nozzle on the secondary
/// link and three motion axes.
pub fn station_tags() -> RawTagTable {
    let mut tags = serde_json::Map::new();
    let mut add = |name: &str, def: Value| {
        tags.insert(name.to_string(), def);
    };

    add("gas.main.flow", dac("AOS32.0.1.2.1", "read_write", 100.0));
    add("gas.main.setpoint", dac("AOS32.0.1.3.1", "read_write", 100.0));
    add("gas.carrier.flow", dac("AOS32.0.1.2.2", "read", 20.0));
    add("gas.carrier.setpoint", dac("AOS32.0.1.3.2", "read_write", 20.0));
    add("vacuum.pressure", plain("AIS16.0.2.1.1", "read"));
    add("vacuum.pump.running", plain("DIS.0.2.2.1", "read"));
    add("vacuum.pump.command", plain("DOS.0.2.3.1", "write"));
    for n in 1..=2 {
        add(&format!("feeders.feeder{n}.running"), plain(&format!("DIS.0.3.1.{n}"), "read"));
        add(&format!("feeders.feeder{n}.enable"), plain(&format!("DOS.0.3.2.{n}"), "write"));
        add(
            &format!("feeders.feeder{n}.duty_cycle"),
            dac(&format!("AOS32.0.3.3.{n}"), "read_write", 100.0),
        );
        add(&format!("feeders.feeder{n}.rate"), plain(&format!("AIS16.0.3.4.{n}"), "read"));
    }
    add("nozzle.heater.temperature", plain("ssh.nozzle.temperature", "read"));
    add("nozzle.heater.enabled", plain("ssh.nozzle.heater", "read_write"));
    for axis in ["x", "y", "z"] {
        add(&format!("motion.{axis}.position"), plain(&format!("MC.{axis}.position"), "read"));
        add(
            &format!("motion.{axis}.target"),
            json!({"physical": format!("MC.{axis}.target"), "access": "read_write", "min": 0, "max": 200}),
        );
        add(
            &format!("motion.{axis}.speed"),
            json!({"physical": format!("MC.{axis}.speed"), "access": "read_write", "min": 0, "max": 100}),
        );
        add(&format!("motion.{axis}.jog"), plain(&format!("MC.{axis}.jog"), "write"));
        add(&format!("motion.{axis}.moving"), plain(&format!("MC.{axis}.moving"), "read"));
        add(&format!("motion.{axis}.homed"), plain(&format!("MC.{axis}.homed"), "read"));
        add(&format!("motion.{axis}.enabled"), plain(&format!("MC.{axis}.enabled"), "read"));
        add(&format!("motion.{axis}.home"), plain(&format!("MC.{axis}.home"), "write"));
    }
    add("motion.stop", plain("MC.stop", "write"));
    add(
        "station.interlock_ok",
        json!({"access": "read_write", "internal": true, "default": true}),
    );

    serde_json::from_value(json!({ "tags": tags, "path_defaults": {} }))
        .expect("valid tag table")
}

pub fn primary_registers() -> Vec<(String, TagValue)> {
    let mut registers: Vec<(String, TagValue)> = vec![
        ("AOS32.0.1.2.1".into(), 2048.0.into()),
        ("AOS32.0.1.3.1".into(), 2048.0.into()),
        ("AOS32.0.1.2.2".into(), 0.0.into()),
        ("AOS32.0.1.3.2".into(), 0.0.into()),
        ("AIS16.0.2.1.1".into(), 3.2.into()),
        ("DIS.0.2.2.1".into(), true.into()),
        ("DOS.0.2.3.1".into(), true.into()),
        ("MC.stop".into(), false.into()),
    ];
    for n in 1..=2 {
        registers.push((format!("DIS.0.3.1.{n}"), false.into()));
        registers.push((format!("DOS.0.3.2.{n}"), false.into()));
        registers.push((format!("AOS32.0.3.3.{n}"), 0.0.into()));
        registers.push((format!("AIS16.0.3.4.{n}"), 0.0.into()));
    }
    for axis in ["x", "y", "z"] {
        registers.push((format!("MC.{axis}.position"), 0.0.into()));
        registers.push((format!("MC.{axis}.target"), 0.0.into()));
        registers.push((format!("MC.{axis}.speed"), 10.0.into()));
        registers.push((format!("MC.{axis}.jog"), 0.0.into()));
        registers.push((format!("MC.{axis}.moving"), false.into()));
        registers.push((format!("MC.{axis}.homed"), true.into()));
        registers.push((format!("MC.{axis}.enabled"), true.into()));
        registers.push((format!("MC.{axis}.home"), false.into()));
    }
    registers
}

pub fn secondary_registers() -> Vec<(String, TagValue)> {
    vec![
        ("ssh.nozzle.temperature".into(), 21.5.into()),
        ("ssh.nozzle.heater".into(), false.into()),
    ]
}

pub fn station_rules() -> RawRuleTable {
    serde_json::from_value(json!({
        "rules": {
            "gas.flowing": {"type": "comparison", "tag": "gas.main.flow", "operator": "gt", "value": 0.5},
            "vacuum.ready": {"type": "multi_condition", "conditions": [
                {"tag": "vacuum.pressure", "operator": "lt", "value": 5},
                {"tag": "vacuum.pump.running", "operator": "eq", "value": true}
            ]},
            "feeders.lead_running": {"type": "comparison", "tag": "feeders.feeder{1|2}.running", "operator": "eq", "value": true},
            "spray.safe": {"type": "all", "tags": ["gas.flowing", "vacuum.ready"]},
            "motion.all_homed": {"type": "all", "tags": ["motion.x.homed", "motion.y.homed", "motion.z.homed"]},
            "motion.all_enabled": {"type": "all", "tags": ["motion.x.enabled", "motion.y.enabled", "motion.z.enabled"]},
            "motion.safe_to_move": {"type": "all", "tags": ["motion.all_enabled", "station.interlock_ok"]}
        }
    }))
    .expect("valid rule table")
}

/// Polling far slower than any test so ticks only happen through `poll_now`
pub fn manual_config() -> CacheConfig {
    CacheConfig {
        poll_interval: Duration::from_secs(3600),
        ..CacheConfig::default()
    }
}

pub struct Rig {
    pub cache: Arc<TagCache>,
    pub plc: SimulatedHandle,
    pub nozzle: SimulatedHandle,
}

impl Rig {
    pub fn new(config: CacheConfig) -> Self {
        let plc = SimulatedLink::with_registers("plc", primary_registers());
        let nozzle = SimulatedLink::with_registers("nozzle", secondary_registers());
        let (plc_handle, nozzle_handle) = (plc.handle(), nozzle.handle());
        let cache = TagCache::new(
            Arc::new(station_tags()),
            Box::new(plc),
            Some(Box::new(nozzle)),
            config,
        );
        Self {
            cache: Arc::new(cache),
            plc: plc_handle,
            nozzle: nozzle_handle,
        }
    }

    /// A cache that is initialized and running
    pub async fn started() -> Self {
        let rig = Self::new(manual_config());
        rig.cache.initialize().await.expect("cache initializes");
        rig.cache.start().await.expect("cache starts");
        rig
    }

    /// Running cache plus a running engine over the station rules
    pub async fn with_engine() -> (Self, Arc<StateEngine>) {
        let rig = Self::started().await;
        let engine = Arc::new(StateEngine::new(rig.cache.clone(), Arc::new(station_rules())));
        engine.initialize().await.expect("engine initializes");
        engine.start().await.expect("engine starts");
        (rig, engine)
    }
}
