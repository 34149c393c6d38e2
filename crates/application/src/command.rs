//! Argument checks shared by the orchestrators; all run before any write.

use domain::{DomainError, Result, TagDescriptor};

use crate::cache::TagCache;

pub(crate) fn finite(what: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DomainError::InvalidCommand(format!(
            "{what} must be a finite number, got {value}"
        )))
    }
}

/// The target tag's descriptor, refusing values outside its declared range
pub(crate) fn within_declared_range(
    cache: &TagCache,
    tag: &str,
    value: f64,
) -> Result<TagDescriptor> {
    let descriptor = cache
        .describe(tag)
        .ok_or_else(|| DomainError::NotMapped(tag.to_string()))?;
    if !descriptor.in_range(value) {
        let bounds = descriptor
            .range
            .map(|(min, max)| format!("[{min}, {max}]"))
            .unwrap_or_else(|| "a finite range".to_string());
        return Err(DomainError::InvalidCommand(format!(
            "{tag}: {value} outside {bounds}"
        )));
    }
    Ok(descriptor)
}

pub(crate) fn within(what: &str, value: f64, (min, max): (f64, f64)) -> Result<f64> {
    if value < min || value > max {
        return Err(DomainError::InvalidCommand(format!(
            "{what} {value} outside [{min}, {max}]"
        )));
    }
    Ok(value)
}
