//! Infrastructure layer - configuration collaborators and hardware links

pub mod config;
pub mod drivers;
pub mod tables;

pub use config::StationConfig;
pub use drivers::{LinkFactory, SimulatedConfig, SimulatedHandle, SimulatedLink};
pub use tables::{JsonRuleTable, JsonTagTable};
