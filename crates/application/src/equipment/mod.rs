mod orchestrator;

pub use orchestrator::EquipmentOrchestrator;
