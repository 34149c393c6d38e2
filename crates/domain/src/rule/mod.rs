mod definition;
mod operator;
mod reference;
mod set;
mod source;

pub use definition::{Comparand, Condition, ConditionDefinition, Rule, RuleBody, RuleDefinition};
pub use operator::Operator;
pub use reference::TagRef;
pub use set::RuleSet;
pub use source::{RawRuleTable, RuleTableSource};

#[cfg(test)]
pub use source::MockRuleTableSource;
