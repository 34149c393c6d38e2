use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tag table as handed over by the configuration collaborator.
///
/// Entries stay as raw JSON so one malformed definition can be skipped
/// without rejecting the whole table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTagTable {
    #[serde(default)]
    pub tags: serde_json::Map<String, serde_json::Value>,
    /// Dot-separated glob (`*` = one segment) -> default value for internal tags
    #[serde(default)]
    pub path_defaults: serde_json::Map<String, serde_json::Value>,
}

/// Source of the tag-definition table
#[cfg_attr(test, mockall::automock)]
pub trait TagTableSource: Send + Sync {
    /// Fails with `DomainError::Config` when the table is absent or unparsable.
    fn load_tag_table(&self) -> Result<RawTagTable>;
}

impl TagTableSource for RawTagTable {
    fn load_tag_table(&self) -> Result<RawTagTable> {
        Ok(self.clone())
    }
}
