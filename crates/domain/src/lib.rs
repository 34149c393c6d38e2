//! Domain layer - Pure station model with no I/O
//!
//! This crate contains:
//! - Tag values, descriptors and the symbolic/physical `TagMap`
//! - The declarative rule model and its dependency ordering
//! - The `HardwareLink` capability consumed by the tag cache
//! - Listener traits, lifecycle states and domain snapshots
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Lookups return `Option`, operational failures return `Result`
//! - Testable in isolation

pub mod driver;
pub mod equipment;
pub mod error;
pub mod lifecycle;
pub mod motion;
pub mod observer;
pub mod rule;
pub mod tag;

// Re-export commonly used types
pub use error::{DomainError, Result};
pub use lifecycle::{HealthStatus, ServiceHealth, ServiceState};
pub use observer::{FactListener, ListenerResult, SnapshotListener, TagListener};
pub use rule::{Rule, RuleSet};
pub use tag::{TagChange, TagDescriptor, TagMap, TagValue};
