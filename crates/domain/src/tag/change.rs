use chrono::{DateTime, Utc};
use serde::Serialize;

use super::TagValue;

/// Where a cached value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Seeded from the tag table or a path default
    Default,
    /// Startup bulk read or poll tick
    Poll,
    /// Direct write of an internal tag
    Write,
    /// Confirmation read after a synchronous write
    ReadBack,
}

/// Last known value of one cache slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub value: TagValue,
    pub source: EntrySource,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: TagValue, source: EntrySource) -> Self {
        Self {
            value,
            source,
            updated_at: Utc::now(),
        }
    }
}

/// Notification emitted when a symbolic tag takes a new value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagChange {
    /// Symbolic name
    pub name: String,
    /// Physical register behind the tag, if any
    pub physical: Option<String>,
    pub value: TagValue,
    pub previous: Option<TagValue>,
    pub timestamp: DateTime<Utc>,
}

impl TagChange {
    pub fn new(
        name: impl Into<String>,
        physical: Option<String>,
        value: TagValue,
        previous: Option<TagValue>,
    ) -> Self {
        Self {
            name: name.into(),
            physical,
            value,
            previous,
            timestamp: Utc::now(),
        }
    }

    /// Whether a subscription on `tag` (symbolic or physical) covers this change.
    pub fn concerns(&self, tag: &str) -> bool {
        self.name == tag || self.physical.as_deref() == Some(tag)
    }
}
