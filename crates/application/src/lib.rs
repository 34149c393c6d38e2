//! Application layer - the station's hardware-state pipeline
//!
//! `TagCache` polls and caches hardware, `StateEngine` derives facts from
//! it, and the orchestrators compose both into equipment and motion views.
//! `ServiceManager` drives their shared life cycle.

pub mod cache;
mod command;
pub mod equipment;
pub mod lifecycle;
pub mod motion;
pub mod observer;
pub mod state;

pub use cache::{CacheConfig, TagCache};
pub use equipment::EquipmentOrchestrator;
pub use lifecycle::{Service, ServiceManager, StationHealth};
pub use motion::{MotionConfig, MotionOrchestrator};
pub use observer::{ListenerId, ListenerRegistry, SnapshotFanout};
pub use state::StateEngine;
