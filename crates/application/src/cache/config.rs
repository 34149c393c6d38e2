use std::time::Duration;

/// Runtime knobs of a [`TagCache`](super::TagCache)
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub poll_interval: Duration,
    /// Upper bound on physical names per bulk read
    pub batch_size: usize,
    /// Physical names with this prefix belong to the secondary text-protocol link
    pub secondary_prefix: String,
    /// Pending change notifications before further changes coalesce per tag
    pub notify_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 50,
            secondary_prefix: "ssh.".to_string(),
            notify_capacity: 1024,
        }
    }
}

impl CacheConfig {
    pub fn is_secondary(&self, physical: &str) -> bool {
        !self.secondary_prefix.is_empty() && physical.starts_with(&self.secondary_prefix)
    }

    /// Batch size with zero clamped to one
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
