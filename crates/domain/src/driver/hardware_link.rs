use std::collections::HashMap;

use async_trait::async_trait;

use super::connection_state::ConnectionState;
use crate::error::DomainError;
use crate::tag::TagValue;

/// Result of a bulk read: names the device could not read are simply absent
pub type ReadBatch = HashMap<String, TagValue>;

/// Minimal capability the tag cache needs from a hardware client.
///
/// Both the bulk register client and the per-tag text client implement
/// this; the cache never depends on anything protocol-specific.
#[async_trait]
pub trait HardwareLink: Send + Sync {
    /// Establish connection to the device
    async fn connect(&mut self) -> Result<(), DomainError>;

    /// Disconnect from the device
    async fn disconnect(&mut self) -> Result<(), DomainError>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Get current connection state
    fn connection_state(&self) -> ConnectionState;

    /// Bulk, best-effort read of physical tags
    async fn get(&mut self, names: &[String]) -> Result<ReadBatch, DomainError>;

    /// Read a single physical tag
    async fn read_tag(&mut self, name: &str) -> Result<TagValue, DomainError>;

    /// Write a single physical tag
    async fn write_tag(&mut self, name: &str, value: TagValue) -> Result<(), DomainError>;

    /// Identifier used in logs and health reports
    fn link_name(&self) -> &str;
}
