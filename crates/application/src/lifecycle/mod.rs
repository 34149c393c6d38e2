mod manager;
mod service;

pub use manager::{ServiceManager, StartupReport, StationHealth};
pub use service::{Service, StateCell};
