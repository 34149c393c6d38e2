use std::collections::{BTreeMap, HashMap};

use domain::rule::{Comparand, Condition, RuleBody, TagRef};
use domain::{RuleSet, TagValue};

use crate::cache::TagCache;

/// Read access to current tag values during a pass
pub trait ValueLookup {
    fn lookup(&self, name: &str) -> Option<TagValue>;
}

impl ValueLookup for TagCache {
    fn lookup(&self, name: &str) -> Option<TagValue> {
        self.get(name)
    }
}

impl ValueLookup for HashMap<String, TagValue> {
    fn lookup(&self, name: &str) -> Option<TagValue> {
        self.get(name).cloned()
    }
}

impl ValueLookup for BTreeMap<String, TagValue> {
    fn lookup(&self, name: &str) -> Option<TagValue> {
        self.get(name).cloned()
    }
}

/// Result of one full pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub facts: BTreeMap<String, bool>,
    /// Rules forced to `false` by missing or non-numeric input, with the reason
    pub failures: BTreeMap<String, String>,
}

/// Evaluate every rule in dependency order.
///
/// A rule name resolves to its fact from this same pass; anything else is
/// looked up as a tag. Missing input makes the fact `false`, never an error.
pub fn evaluate_all(rules: &RuleSet, values: &dyn ValueLookup) -> Evaluation {
    let mut evaluation = Evaluation::default();
    for rule in rules.ordered() {
        let scope = Scope {
            rules,
            facts: &evaluation.facts,
            values,
        };
        let outcome = match &rule.body {
            RuleBody::Comparison(condition) => scope.condition(condition),
            RuleBody::MultiCondition(conditions) => scope.all_conditions(conditions),
            RuleBody::AllOf(refs) => scope.all_true(refs),
        };
        let fact = match outcome {
            Ok(fact) => fact,
            Err(reason) => {
                evaluation.failures.insert(rule.name.clone(), reason);
                false
            }
        };
        evaluation.facts.insert(rule.name.clone(), fact);
    }
    evaluation
}

struct Scope<'a> {
    rules: &'a RuleSet,
    facts: &'a BTreeMap<String, bool>,
    values: &'a dyn ValueLookup,
}

impl Scope<'_> {
    /// First variant that resolves, facts taking precedence over tags
    fn resolve(&self, reference: &TagRef) -> Option<TagValue> {
        reference.variants().iter().find_map(|name| {
            if self.rules.contains(name) {
                self.facts.get(name).map(|f| TagValue::Bool(*f))
            } else {
                self.values.lookup(name)
            }
        })
    }

    fn number(&self, reference: &TagRef) -> Result<f64, String> {
        let value = self
            .resolve(reference)
            .ok_or_else(|| format!("{reference} has no value"))?;
        value
            .as_f64()
            .ok_or_else(|| format!("{reference} is not numeric: {value}"))
    }

    fn condition(&self, condition: &Condition) -> Result<bool, String> {
        let lhs = self.number(&condition.tag)?;
        let rhs = match &condition.comparand {
            Comparand::Constant(value) => value
                .as_f64()
                .ok_or_else(|| format!("comparand is not numeric: {value}"))?,
            Comparand::Reference(reference) => self.number(reference)?,
        };
        Ok(condition.operator.apply(lhs, rhs))
    }

    fn all_conditions(&self, conditions: &[Condition]) -> Result<bool, String> {
        for condition in conditions {
            if !self.condition(condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn all_true(&self, refs: &[TagRef]) -> Result<bool, String> {
        for reference in refs {
            let value = self
                .resolve(reference)
                .ok_or_else(|| format!("{reference} has no value"))?;
            let flag = value
                .as_bool()
                .ok_or_else(|| format!("{reference} is not boolean: {value}"))?;
            if !flag {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
