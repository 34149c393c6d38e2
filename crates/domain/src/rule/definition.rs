use serde::{Deserialize, Serialize};

use super::{Operator, TagRef};
use crate::error::{DomainError, Result};
use crate::tag::TagValue;

/// One comparison as written in the rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub tag: String,
    pub operator: Operator,
    /// Constant, or `"{name}"` placeholder naming another tag/fact
    #[serde(alias = "comparand")]
    pub value: serde_json::Value,
}

/// Rule body as written in the rule table, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleDefinition {
    Comparison(ConditionDefinition),
    MultiCondition {
        conditions: Vec<ConditionDefinition>,
    },
    #[serde(alias = "all_of")]
    All { tags: Vec<String> },
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Comparand {
    Constant(TagValue),
    Reference(TagRef),
}

impl Comparand {
    fn parse(raw: &serde_json::Value) -> Result<Self> {
        if let serde_json::Value::String(s) = raw {
            if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
                if inner.is_empty() || inner.contains(['{', '}', '|']) {
                    return Err(DomainError::Config(format!("Invalid placeholder '{s}'")));
                }
                return Ok(Self::Reference(TagRef::parse(inner)?));
            }
        }
        TagValue::from_json(raw)
            .map(Self::Constant)
            .ok_or_else(|| DomainError::Config(format!("Comparand must be a scalar, got {raw}")))
    }
}

/// A single `tag <op> comparand` test
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub tag: TagRef,
    pub operator: Operator,
    pub comparand: Comparand,
}

impl Condition {
    fn compile(def: ConditionDefinition) -> Result<Self> {
        Ok(Self {
            tag: TagRef::parse(&def.tag)?,
            operator: def.operator,
            comparand: Comparand::parse(&def.value)?,
        })
    }

    /// Every name this condition reads
    pub fn references(&self) -> impl Iterator<Item = &TagRef> {
        let comparand = match &self.comparand {
            Comparand::Reference(r) => Some(r),
            Comparand::Constant(_) => None,
        };
        std::iter::once(&self.tag).chain(comparand)
    }
}

/// Closed set of rule shapes, decoded once at load time
#[derive(Debug, Clone, PartialEq)]
pub enum RuleBody {
    Comparison(Condition),
    MultiCondition(Vec<Condition>),
    AllOf(Vec<TagRef>),
}

/// A named derivation producing one boolean fact
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub body: RuleBody,
}

impl Rule {
    pub fn compile(name: impl Into<String>, definition: RuleDefinition) -> Result<Self> {
        let name = name.into();
        let body = match definition {
            RuleDefinition::Comparison(def) => RuleBody::Comparison(Condition::compile(def)?),
            RuleDefinition::MultiCondition { conditions } => {
                if conditions.is_empty() {
                    return Err(DomainError::Config(format!(
                        "Rule {name} has no conditions"
                    )));
                }
                RuleBody::MultiCondition(
                    conditions
                        .into_iter()
                        .map(Condition::compile)
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            RuleDefinition::All { tags } => {
                if tags.is_empty() {
                    return Err(DomainError::Config(format!("Rule {name} lists no tags")));
                }
                RuleBody::AllOf(
                    tags.iter()
                        .map(|t| TagRef::parse(t))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
        };
        Ok(Self { name, body })
    }

    /// Decodes a raw JSON body, rejecting unknown `type` discriminators.
    pub fn from_json(name: impl Into<String>, raw: serde_json::Value) -> Result<Self> {
        let name = name.into();
        let definition: RuleDefinition = serde_json::from_value(raw)
            .map_err(|e| DomainError::Config(format!("Rule {name}: {e}")))?;
        Self::compile(name, definition)
    }

    /// Every tag/fact reference the rule reads, comparand placeholders included
    pub fn references(&self) -> Vec<&TagRef> {
        match &self.body {
            RuleBody::Comparison(c) => c.references().collect(),
            RuleBody::MultiCondition(cs) => cs.iter().flat_map(|c| c.references()).collect(),
            RuleBody::AllOf(tags) => tags.iter().collect(),
        }
    }
}
