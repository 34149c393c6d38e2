mod common;

use std::sync::Arc;

use application::{EquipmentOrchestrator, MotionConfig, MotionOrchestrator, Service, StateEngine};
use common::{ChannelListener, Rig, approx, eventually, next};
use domain::equipment::{EquipmentState, GasChannel};
use domain::motion::{Axis, MotionState};
use domain::{DomainError, ServiceState, TagValue};

async fn equipment() -> (Rig, Arc<StateEngine>, EquipmentOrchestrator) {
    let (rig, engine) = Rig::with_engine().await;
    let equipment = EquipmentOrchestrator::new(rig.cache.clone(), engine.clone());
    equipment.initialize().await.unwrap();
    equipment.start().await.unwrap();
    (rig, engine, equipment)
}

async fn motion() -> (Rig, Arc<StateEngine>, MotionOrchestrator) {
    let (rig, engine) = Rig::with_engine().await;
    let motion = MotionOrchestrator::new(rig.cache.clone(), engine.clone(), MotionConfig::default());
    motion.initialize().await.unwrap();
    motion.start().await.unwrap();
    (rig, engine, motion)
}

fn is_invalid<T>(result: Result<T, DomainError>) -> bool {
    matches!(result, Err(DomainError::InvalidCommand(_)))
}

#[tokio::test]
async fn test_equipment_snapshot() {
    let (_rig, _engine, equipment) = equipment().await;

    let state = equipment.get_state().unwrap();
    assert_eq!(state.gas.len(), 2);
    assert_eq!(state.gas[0].channel, GasChannel::Main);
    assert!((state.gas[0].flow - 50.01).abs() < 0.01);
    assert!(state.gas_flowing);
    assert!(state.vacuum.ready);
    assert!(state.vacuum.pump_running);
    assert_eq!(state.feeders.len(), 2);
    assert!(!state.any_feeder_running);
    assert_eq!(state.nozzle.temperature, 21.5);
    assert!(!state.nozzle.heater_enabled);
    assert!(state.spray_safe);
}

#[tokio::test]
async fn test_any_feeder_running_covers_every_feeder() {
    let (rig, engine, equipment) = equipment().await;

    rig.plc.set_register("DIS.0.3.1.2", true);
    rig.cache.poll_now().await.unwrap();

    let state = equipment.get_state().unwrap();
    assert!(!state.feeders[0].running);
    assert!(state.feeders[1].running);
    assert!(state.any_feeder_running);
    // The lead-feeder fact follows feeder 1 while it reports
    assert!(!engine.get("feeders.lead_running"));
}

#[tokio::test]
async fn test_gas_flow_setpoint() {
    let (rig, _engine, equipment) = equipment().await;

    equipment.set_gas_flow(GasChannel::Main, 40.0).await.unwrap();
    let (physical, _) = rig.plc.writes().pop().unwrap();
    assert_eq!(physical, "AOS32.0.1.3.1");

    rig.cache.poll_now().await.unwrap();
    assert!(approx(rig.cache.get("gas.main.setpoint"), 40.0));
}

#[tokio::test]
async fn test_gas_flow_validation_happens_before_any_write() {
    let (rig, _engine, equipment) = equipment().await;

    assert!(is_invalid(equipment.set_gas_flow(GasChannel::Main, 150.0).await));
    assert!(is_invalid(equipment.set_gas_flow(GasChannel::Carrier, 25.0).await));
    assert!(is_invalid(equipment.set_gas_flow(GasChannel::Main, f64::NAN).await));
    assert!(is_invalid(equipment.set_gas_flow(GasChannel::Main, -1.0).await));
    assert!(rig.plc.writes().is_empty());
}

#[tokio::test]
async fn test_feeder_commands() {
    let (rig, _engine, equipment) = equipment().await;

    assert!(is_invalid(equipment.set_feeder_duty_cycle(3, 10.0).await));
    assert!(is_invalid(equipment.set_feeder_duty_cycle(1, 100.5).await));
    assert!(is_invalid(equipment.set_feeder_running(0, true).await));
    assert!(rig.plc.writes().is_empty());

    equipment.set_feeder_duty_cycle(1, 60.0).await.unwrap();
    equipment.set_feeder_running(2, true).await.unwrap();

    let writes = rig.plc.writes();
    assert_eq!(writes[0].0, "AOS32.0.3.3.1");
    assert_eq!(writes[1], ("DOS.0.3.2.2".to_string(), TagValue::Bool(true)));
}

#[tokio::test]
async fn test_vacuum_and_nozzle_commands() {
    let (rig, _engine, equipment) = equipment().await;

    equipment.set_vacuum_pump(false).await.unwrap();
    assert_eq!(
        rig.plc.writes(),
        vec![("DOS.0.2.3.1".to_string(), TagValue::Bool(false))]
    );

    // The nozzle sits on the read-back link, so the snapshot reflects it at once
    equipment.set_nozzle_heater(true).await.unwrap();
    assert!(equipment.get_state().unwrap().nozzle.heater_enabled);
}

#[tokio::test]
async fn test_equipment_listener_receives_snapshot_after_command() {
    let (_rig, _engine, equipment) = equipment().await;
    let (listener, mut rx) = ChannelListener::<EquipmentState>::new();
    let id = equipment.on_state_changed(listener);

    equipment.set_nozzle_heater(true).await.unwrap();

    let snapshot = next(&mut rx).await.expect("snapshot delivered");
    assert!(snapshot.nozzle.heater_enabled);
    assert!(equipment.remove_listener(&id));
}

#[tokio::test]
async fn test_equipment_snapshot_fails_when_a_value_is_missing() {
    let rig = Rig::new(common::manual_config());
    rig.nozzle.refuse_connect(true);
    rig.cache.initialize().await.unwrap();
    rig.cache.start().await.unwrap();
    let engine = Arc::new(StateEngine::new(rig.cache.clone(), Arc::new(common::station_rules())));
    engine.initialize().await.unwrap();
    engine.start().await.unwrap();
    let equipment = EquipmentOrchestrator::new(rig.cache.clone(), engine);
    equipment.initialize().await.unwrap();
    equipment.start().await.unwrap();

    assert!(matches!(equipment.get_state(), Err(DomainError::Unavailable(_))));
    assert!(!equipment.health().details.is_empty());
}

#[tokio::test]
async fn test_equipment_requires_running() {
    let (rig, engine) = Rig::with_engine().await;
    let equipment = EquipmentOrchestrator::new(rig.cache.clone(), engine);

    assert!(matches!(equipment.get_state(), Err(DomainError::NotRunning(_))));
    assert!(matches!(
        equipment.set_vacuum_pump(true).await,
        Err(DomainError::NotRunning(_))
    ));
}

#[tokio::test]
async fn test_equipment_initialize_requires_running_cache() {
    let rig = Rig::new(common::manual_config());
    let engine = Arc::new(StateEngine::new(rig.cache.clone(), Arc::new(common::station_rules())));
    let equipment = EquipmentOrchestrator::new(rig.cache.clone(), engine);

    assert!(matches!(equipment.initialize().await, Err(DomainError::NotRunning(_))));
    assert_eq!(equipment.state(), ServiceState::Failed);
}

#[tokio::test]
async fn test_motion_snapshot() {
    let (_rig, _engine, motion) = motion().await;

    let state = motion.get_state().unwrap();
    assert_eq!(state.axes.len(), 3);
    let x = state.axis(Axis::X).unwrap();
    assert!(x.enabled && x.homed && !x.moving);
    assert!(state.safe_to_move);
    assert!(!state.in_motion);
}

#[tokio::test]
async fn test_in_motion_follows_any_axis() {
    let (rig, _engine, motion) = motion().await;

    rig.plc.set_register("MC.y.moving", true);
    rig.cache.poll_now().await.unwrap();

    let state = motion.get_state().unwrap();
    assert!(!state.axis(Axis::X).unwrap().moving);
    assert!(state.axis(Axis::Y).unwrap().moving);
    assert!(state.in_motion);
    assert!(state.all_homed);

    rig.plc.set_register("MC.y.moving", false);
    rig.cache.poll_now().await.unwrap();
    assert!(!motion.get_state().unwrap().in_motion);
}

#[tokio::test]
async fn test_move_writes_speed_before_target() {
    let (rig, _engine, motion) = motion().await;

    motion.move_to(Axis::X, 100.0, 20.0).await.unwrap();

    assert_eq!(
        rig.plc.writes(),
        vec![
            ("MC.x.speed".to_string(), TagValue::Number(20.0)),
            ("MC.x.target".to_string(), TagValue::Number(100.0)),
        ]
    );
}

#[tokio::test]
async fn test_move_validation() {
    let (rig, _engine, motion) = motion().await;

    assert!(is_invalid(motion.move_to(Axis::X, 250.0, 20.0).await));
    assert!(is_invalid(motion.move_to(Axis::X, 100.0, 0.0).await));
    assert!(is_invalid(motion.move_to(Axis::X, 100.0, 150.0).await));
    assert!(is_invalid(motion.move_to(Axis::Y, f64::INFINITY, 10.0).await));
    assert!(rig.plc.writes().is_empty());
}

#[tokio::test]
async fn test_jog_and_home() {
    let (rig, _engine, motion) = motion().await;

    assert!(is_invalid(motion.jog(Axis::Z, 0.0).await));
    assert!(is_invalid(motion.jog(Axis::Z, 11.0).await));
    motion.jog(Axis::Z, -5.0).await.unwrap();
    motion.home(Axis::X).await.unwrap();

    assert_eq!(
        rig.plc.writes(),
        vec![
            ("MC.z.jog".to_string(), TagValue::Number(-5.0)),
            ("MC.x.home".to_string(), TagValue::Bool(true)),
        ]
    );
}

#[tokio::test]
async fn test_interlock_blocks_motion_but_not_stop() {
    let (rig, engine, motion) = motion().await;

    rig.cache.set("station.interlock_ok", false).await.unwrap();
    assert!(eventually(|| !engine.get("motion.safe_to_move")).await);

    assert!(is_invalid(motion.move_to(Axis::X, 10.0, 10.0).await));
    assert!(is_invalid(motion.jog(Axis::X, 1.0).await));
    assert!(is_invalid(motion.home(Axis::X).await));

    motion.stop_motion().await.unwrap();
    assert_eq!(
        rig.plc.writes(),
        vec![("MC.stop".to_string(), TagValue::Bool(true))]
    );
}

#[tokio::test]
async fn test_motion_listener() {
    let (_rig, _engine, motion) = motion().await;
    let (listener, mut rx) = ChannelListener::<MotionState>::new();
    motion.on_state_changed(listener);

    motion.stop_motion().await.unwrap();

    let snapshot = next(&mut rx).await.unwrap();
    assert_eq!(snapshot.axes.len(), 3);
}

#[tokio::test]
async fn test_motion_rejects_bad_jog_limit() {
    let (rig, engine) = Rig::with_engine().await;
    let motion = MotionOrchestrator::new(rig.cache.clone(), engine, MotionConfig { max_jog_step: 0.0 });

    assert!(matches!(motion.initialize().await, Err(DomainError::Config(_))));
    assert_eq!(motion.state(), ServiceState::Failed);
}

#[tokio::test]
async fn test_stopped_motion_refuses_commands() {
    let (_rig, _engine, motion) = motion().await;

    motion.stop().await.unwrap();

    assert!(matches!(
        motion.move_to(Axis::X, 10.0, 10.0).await,
        Err(DomainError::NotRunning(_))
    ));
    assert!(matches!(motion.stop_motion().await, Err(DomainError::NotRunning(_))));
}
