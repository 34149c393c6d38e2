use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{RawRuleTable, Rule, RuleTableSource};
use crate::error::{DomainError, Result};
use crate::tag::LoadIssue;

/// Compiled rule graph in evaluation order.
///
/// Rules are ordered topologically once at load: every rule comes after
/// all rules it references by name, so a single in-order pass always sees
/// current-pass results. Depth 0 rules ("base" rules) read raw tags only.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    ordered: Vec<Rule>,
    depth: HashMap<String, usize>,
    dependencies: HashMap<String, BTreeSet<String>>,
    issues: Vec<LoadIssue>,
}

impl RuleSet {
    /// Loads and compiles the table. An absent table is fatal, bad rules are not.
    pub fn load(source: &dyn RuleTableSource) -> Result<Self> {
        let table = source.load_rule_table()?;
        Ok(Self::from_table(table))
    }

    pub fn from_table(table: RawRuleTable) -> Self {
        let mut rules = Vec::with_capacity(table.rules.len());
        let mut issues = Vec::new();
        for (name, raw) in table.rules {
            match Rule::from_json(&name, raw) {
                Ok(rule) => rules.push(rule),
                Err(e) => issues.push(LoadIssue::new(&name, e.to_string())),
            }
        }
        let mut set = Self::compile(rules);
        issues.append(&mut set.issues);
        set.issues = issues;
        set
    }

    /// Orders `rules` topologically. Rules in (or downstream of) a cycle are rejected.
    pub fn compile(rules: Vec<Rule>) -> Self {
        let mut by_name: BTreeMap<String, Rule> = BTreeMap::new();
        let mut issues = Vec::new();
        for rule in rules {
            if by_name.contains_key(&rule.name) {
                issues.push(LoadIssue::new(&rule.name, "duplicate rule name"));
                continue;
            }
            by_name.insert(rule.name.clone(), rule);
        }

        // A reference counts as a dependency when any wildcard variant names a rule
        let dependencies: HashMap<String, BTreeSet<String>> = by_name
            .values()
            .map(|rule| {
                let deps = rule
                    .references()
                    .into_iter()
                    .flat_map(|r| r.variants().iter())
                    .filter(|name| by_name.contains_key(name.as_str()))
                    .cloned()
                    .collect();
                (rule.name.clone(), deps)
            })
            .collect();

        let mut remaining: BTreeMap<String, usize> = dependencies
            .iter()
            .map(|(name, deps)| (name.clone(), deps.len()))
            .collect();
        let mut ready: BTreeSet<String> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| name.clone())
            .collect();

        let mut order = Vec::with_capacity(by_name.len());
        let mut depth: HashMap<String, usize> = HashMap::new();

        while let Some(name) = ready.pop_first() {
            remaining.remove(&name);
            let level = dependencies[&name]
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(name.clone(), level);

            for (other, deps) in &dependencies {
                if deps.contains(&name) {
                    if let Some(count) = remaining.get_mut(other) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(other.clone());
                        }
                    }
                }
            }
            order.push(name);
        }

        for name in remaining.keys() {
            issues.push(LoadIssue::new(
                name,
                "rule is part of, or depends on, a dependency cycle",
            ));
        }

        let ordered = order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect();
        let dependencies = dependencies
            .into_iter()
            .filter(|(name, _)| depth.contains_key(name))
            .collect();

        Self {
            ordered,
            depth,
            dependencies,
            issues,
        }
    }

    /// Rules in evaluation order
    pub fn ordered(&self) -> &[Rule] {
        &self.ordered
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.ordered.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.depth.contains_key(name)
    }

    /// 0 for base rules, 1 + deepest dependency otherwise
    pub fn depth(&self, name: &str) -> Option<usize> {
        self.depth.get(name).copied()
    }

    pub fn is_base(&self, name: &str) -> bool {
        self.depth(name) == Some(0)
    }

    /// Rule names this rule reads as facts
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(name)
    }

    pub fn base_rules(&self) -> impl Iterator<Item = &Rule> {
        self.ordered.iter().filter(|r| self.is_base(&r.name))
    }

    pub fn dependent_rules(&self) -> impl Iterator<Item = &Rule> {
        self.ordered.iter().filter(|r| !self.is_base(&r.name))
    }

    pub fn issues(&self) -> &[LoadIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Ensures at least one rule survived compilation.
    pub fn require_rules(self) -> Result<Self> {
        if self.is_empty() {
            return Err(DomainError::Config("Rule table defines no usable rules".to_string()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::MockRuleTableSource;
    use serde_json::json;

    fn table(rules: serde_json::Value) -> RawRuleTable {
        serde_json::from_value(json!({ "rules": rules })).unwrap()
    }

    fn position(set: &RuleSet, name: &str) -> usize {
        set.ordered().iter().position(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_dependency_ordering_three_levels() {
        let set = RuleSet::from_table(table(json!({
            "c.top": {"type": "all", "tags": ["b.middle", "raw.flag"]},
            "b.middle": {"type": "all", "tags": ["a.base"]},
            "a.base": {"type": "comparison", "tag": "raw.level", "operator": "gt", "value": 1}
        })));

        assert_eq!(set.len(), 3);
        assert_eq!(set.depth("a.base"), Some(0));
        assert_eq!(set.depth("b.middle"), Some(1));
        assert_eq!(set.depth("c.top"), Some(2));
        assert!(position(&set, "a.base") < position(&set, "b.middle"));
        assert!(position(&set, "b.middle") < position(&set, "c.top"));
        assert_eq!(set.base_rules().count(), 1);
        assert_eq!(set.dependent_rules().count(), 2);
    }

    #[test]
    fn test_wildcard_variant_naming_a_rule_is_a_dependency() {
        let set = RuleSet::from_table(table(json!({
            "feeder1.ok": {"type": "comparison", "tag": "feeders.feeder1.rate", "operator": "gt", "value": 0},
            "any.ok": {"type": "all", "tags": ["feeder{1|2}.ok"]}
        })));
        assert!(set.is_base("feeder1.ok"));
        assert_eq!(set.depth("any.ok"), Some(1));
    }

    #[test]
    fn test_placeholder_naming_a_rule_is_a_dependency() {
        let set = RuleSet::from_table(table(json!({
            "limit.reached": {"type": "comparison", "tag": "x", "operator": "gt", "value": 3},
            "echo": {"type": "comparison", "tag": "y", "operator": "eq", "value": "{limit.reached}"}
        })));
        assert_eq!(set.depth("echo"), Some(1));
        assert!(set.dependencies("echo").unwrap().contains("limit.reached"));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let set = RuleSet::from_table(table(json!({
            "a": {"type": "all", "tags": ["b"]},
            "b": {"type": "all", "tags": ["a"]},
            "c": {"type": "all", "tags": ["a"]},
            "d": {"type": "all", "tags": ["raw.ok"]}
        })));
        assert_eq!(set.len(), 1);
        assert!(set.contains("d"));
        assert_eq!(set.issues().len(), 3);
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let set = RuleSet::from_table(table(json!({
            "good": {"type": "all", "tags": ["raw.ok"]},
            "unknown_type": {"type": "xor", "tags": ["a", "b"]},
            "missing_field": {"type": "comparison", "tag": "a"}
        })));
        assert_eq!(set.len(), 1);
        let skipped: Vec<&str> = set.issues().iter().map(|i| i.name.as_str()).collect();
        assert!(skipped.contains(&"unknown_type"));
        assert!(skipped.contains(&"missing_field"));
    }

    #[test]
    fn test_load_propagates_missing_table() {
        let mut source = MockRuleTableSource::new();
        source
            .expect_load_rule_table()
            .returning(|| Err(DomainError::Config("rules.json not found".into())));
        assert!(matches!(RuleSet::load(&source), Err(DomainError::Config(_))));
    }

    #[test]
    fn test_require_rules() {
        let mut source = MockRuleTableSource::new();
        source
            .expect_load_rule_table()
            .returning(|| Ok(RawRuleTable::default()));
        let set = RuleSet::load(&source).unwrap();
        assert!(set.require_rules().is_err());
    }
}
