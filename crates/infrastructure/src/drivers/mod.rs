mod simulated;

pub use simulated::{SimulatedConfig, SimulatedHandle, SimulatedLink};

use std::path::Path;

use domain::DomainError;
use domain::driver::{HardwareLink, LinkKind};

/// Factory for creating hardware links
pub struct LinkFactory;

impl LinkFactory {
    /// Create a link from its kind and settings; relative file settings resolve against `base_dir`
    pub fn create_link(
        kind: LinkKind,
        settings: serde_json::Value,
        base_dir: &Path,
    ) -> Result<Box<dyn HardwareLink>, DomainError> {
        match kind {
            LinkKind::Simulated => {
                let link = Self::create_simulated(settings, base_dir)?;
                Ok(Box::new(link) as Box<dyn HardwareLink>)
            }
            LinkKind::Register => Err(DomainError::Config(
                "Register-protocol link is provided by the PLC client package, not this build"
                    .to_string(),
            )),
            LinkKind::Text => Err(DomainError::Config(
                "Text-protocol link is provided by the secondary client package, not this build"
                    .to_string(),
            )),
        }
    }

    pub fn create_simulated(
        settings: serde_json::Value,
        base_dir: &Path,
    ) -> Result<SimulatedLink, DomainError> {
        let settings = if settings.is_null() {
            serde_json::json!({})
        } else {
            settings
        };
        let mut config: SimulatedConfig = serde_json::from_value(settings).map_err(|e| {
            DomainError::Config(format!("Invalid simulated link settings: {}", e))
        })?;
        if let Some(path) = config.registers_file.take() {
            config.registers_file = Some(if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            });
        }
        SimulatedLink::from_config(config)
    }
}
