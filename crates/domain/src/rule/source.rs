use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Rule table as handed over by the configuration collaborator (fact name -> raw body)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRuleTable {
    #[serde(default)]
    pub rules: serde_json::Map<String, serde_json::Value>,
}

/// Source of the rule-definition table
#[cfg_attr(test, mockall::automock)]
pub trait RuleTableSource: Send + Sync {
    /// Fails with `DomainError::Config` when the table is absent or unparsable.
    fn load_rule_table(&self) -> Result<RawRuleTable>;
}

impl RuleTableSource for RawRuleTable {
    fn load_rule_table(&self) -> Result<RawRuleTable> {
        Ok(self.clone())
    }
}
