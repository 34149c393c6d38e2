mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use application::{Service, StateEngine};
use common::{ChannelListener, Rig, next, stays_quiet};
use domain::rule::RawRuleTable;
use domain::{DomainError, HealthStatus, ServiceState};
use serde_json::json;

type Facts = BTreeMap<String, bool>;

fn rules(table: serde_json::Value) -> Arc<RawRuleTable> {
    Arc::new(serde_json::from_value(json!({ "rules": table })).unwrap())
}

#[tokio::test]
async fn test_start_runs_an_initial_pass() {
    let (_rig, engine) = Rig::with_engine().await;

    assert!(engine.pass_count() >= 1);
    assert!(engine.get("gas.flowing"));
    assert!(engine.get("vacuum.ready"));
    assert!(engine.get("spray.safe"));
    assert!(engine.get("motion.safe_to_move"));
    assert!(!engine.get("feeders.lead_running"));
    assert!(engine.get("motion.all_homed"));
    assert_eq!(engine.get_all().len(), 7);
    assert_eq!(engine.health().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_unknown_fact_reads_false() {
    let (_rig, engine) = Rig::with_engine().await;
    assert!(!engine.get("no.such.fact"));
}

#[tokio::test]
async fn test_tag_change_propagates_through_dependent_rules() {
    let (rig, engine) = Rig::with_engine().await;
    let (listener, mut rx) = ChannelListener::<Facts>::new();
    engine.watch(&["spray.safe"], listener);

    rig.plc.set_register("AIS16.0.2.1.1", 8.0);
    rig.cache.poll_now().await.unwrap();

    let facts = next(&mut rx).await.expect("spray.safe changed");
    assert_eq!(facts, Facts::from([("spray.safe".to_string(), false)]));
    assert!(!engine.get("vacuum.ready"));
    assert!(engine.get("gas.flowing"));
}

#[tokio::test]
async fn test_listener_is_silent_when_watched_facts_hold() {
    let (rig, engine) = Rig::with_engine().await;
    let (listener, mut rx) = ChannelListener::<Facts>::new();
    engine.watch(&["gas.flowing"], listener);

    rig.plc.set_register("AIS16.0.2.1.1", 8.0);
    rig.cache.poll_now().await.unwrap();

    assert!(stays_quiet(&mut rx).await);
}

#[tokio::test]
async fn test_predicate_listener_receives_watched_subset() {
    let (rig, engine) = Rig::with_engine().await;
    let (listener, mut rx) = ChannelListener::<Facts>::new();
    engine.on_changed(|fact| fact.starts_with("motion."), listener);

    rig.plc.set_register("MC.y.homed", false);
    rig.cache.poll_now().await.unwrap();

    let facts = next(&mut rx).await.unwrap();
    assert_eq!(facts.len(), 3);
    assert_eq!(facts.get("motion.all_homed"), Some(&false));
    assert_eq!(facts.get("motion.safe_to_move"), Some(&true));
}

#[tokio::test]
async fn test_internal_interlock_gates_safe_to_move() {
    let (rig, engine) = Rig::with_engine().await;
    let (listener, mut rx) = ChannelListener::<Facts>::new();
    engine.watch(&["motion.safe_to_move"], listener);

    rig.cache.set("station.interlock_ok", false).await.unwrap();

    let facts = next(&mut rx).await.unwrap();
    assert_eq!(facts.get("motion.safe_to_move"), Some(&false));
    assert!(engine.get("motion.all_enabled"));
}

#[tokio::test]
async fn test_removed_listener_is_not_called() {
    let (rig, engine) = Rig::with_engine().await;
    let (listener, mut rx) = ChannelListener::<Facts>::new();
    let id = engine.watch(&["vacuum.ready"], listener);

    assert!(engine.remove_listener(&id));
    rig.plc.set_register("AIS16.0.2.1.1", 8.0);
    rig.cache.poll_now().await.unwrap();
    engine.evaluate_now().await.unwrap();

    assert!(stays_quiet(&mut rx).await);
}

#[tokio::test]
async fn test_missing_input_is_false_and_reported() {
    let rig = Rig::started().await;
    let engine = StateEngine::new(
        rig.cache.clone(),
        rules(json!({
            "ghost.ready": {"type": "comparison", "tag": "ghost.level", "operator": "gt", "value": 1},
            "gas.flowing": {"type": "comparison", "tag": "gas.main.flow", "operator": "gt", "value": 0.5}
        })),
    );
    engine.initialize().await.unwrap();
    engine.start().await.unwrap();

    assert!(!engine.get("ghost.ready"));
    assert!(engine.get("gas.flowing"));
    let health = engine.health();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(health.details.iter().any(|d| d.contains("missing input")));
}

#[tokio::test]
async fn test_cyclic_rules_are_skipped() {
    let rig = Rig::started().await;
    let engine = StateEngine::new(
        rig.cache.clone(),
        rules(json!({
            "a": {"type": "all", "tags": ["b"]},
            "b": {"type": "all", "tags": ["a"]},
            "gas.flowing": {"type": "comparison", "tag": "gas.main.flow", "operator": "gt", "value": 0.5}
        })),
    );
    engine.initialize().await.unwrap();
    engine.start().await.unwrap();

    assert_eq!(engine.rules().len(), 1);
    assert!(engine.get("gas.flowing"));
    assert!(engine.health().details.iter().any(|d| d.contains("skipped")));
}

#[tokio::test]
async fn test_initialize_requires_running_cache() {
    let rig = Rig::new(common::manual_config());
    let engine = StateEngine::new(rig.cache.clone(), Arc::new(common::station_rules()));

    assert!(matches!(engine.initialize().await, Err(DomainError::NotRunning(_))));
    assert_eq!(engine.state(), ServiceState::Failed);
}

#[tokio::test]
async fn test_empty_rule_table_is_fatal() {
    let rig = Rig::started().await;
    let engine = StateEngine::new(rig.cache.clone(), Arc::new(RawRuleTable::default()));

    assert!(matches!(engine.initialize().await, Err(DomainError::Config(_))));
    assert_eq!(engine.health().status, HealthStatus::Down);
    assert!(engine.health().details.iter().any(|d| d.contains("rule table")));
}

#[tokio::test]
async fn test_stop_clears_facts_and_unsubscribes() {
    let (rig, engine) = Rig::with_engine().await;
    assert_eq!(rig.cache.subscriber_count(), 1);

    engine.stop().await.unwrap();

    assert_eq!(rig.cache.subscriber_count(), 0);
    assert!(!engine.get("gas.flowing"));
    assert!(engine.get_all().is_empty());
    assert!(matches!(engine.evaluate_now().await, Err(DomainError::NotRunning(_))));
    assert_eq!(engine.state(), ServiceState::Stopped);
}
