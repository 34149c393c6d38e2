use std::collections::HashMap;

use super::{RawTagTable, ScalingKind, TagDefinition, TagDescriptor, TagTableSource, TagValue};
use crate::error::{DomainError, Result};

/// A table entry that was skipped or accepted with a caveat while loading
#[derive(Debug, Clone, PartialEq)]
pub struct LoadIssue {
    pub name: String,
    pub reason: String,
}

impl LoadIssue {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct PathDefault {
    segments: Vec<String>,
    value: TagValue,
}

impl PathDefault {
    fn matches(&self, name: &str) -> bool {
        let parts: Vec<&str> = name.split('.').collect();
        parts.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(parts)
                .all(|(pattern, part)| pattern == "*" || pattern == part)
    }
}

/// Immutable translation table between symbolic and physical tag names.
///
/// Loaded once; every symbolic name maps to at most one physical register,
/// a physical register may back several symbolic names.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    descriptors: HashMap<String, TagDescriptor>,
    physical_index: HashMap<String, Vec<String>>,
    path_defaults: Vec<PathDefault>,
    issues: Vec<LoadIssue>,
}

impl TagMap {
    /// Loads the table from its source. An absent table is fatal, bad entries are not.
    pub fn load(source: &dyn TagTableSource) -> Result<Self> {
        let table = source.load_tag_table()?;
        if table.tags.is_empty() {
            return Err(DomainError::Config("Tag table defines no tags".to_string()));
        }
        Ok(Self::from_table(table))
    }

    /// Builds the map, recording every skipped entry in [`TagMap::issues`].
    pub fn from_table(table: RawTagTable) -> Self {
        let mut map = Self::default();

        for (name, raw) in table.tags {
            let definition: TagDefinition = match serde_json::from_value(raw) {
                Ok(def) => def,
                Err(e) => {
                    map.issues.push(LoadIssue::new(&name, format!("malformed entry: {e}")));
                    continue;
                }
            };
            match TagDescriptor::from_definition(&name, definition) {
                Ok(descriptor) => map.insert(descriptor),
                Err(e) => map.issues.push(LoadIssue::new(&name, e.to_string())),
            }
        }

        for (pattern, raw) in table.path_defaults {
            match TagValue::from_json(&raw) {
                Some(value) if !pattern.trim().is_empty() => map.path_defaults.push(PathDefault {
                    segments: pattern.split('.').map(str::to_string).collect(),
                    value,
                }),
                _ => map
                    .issues
                    .push(LoadIssue::new(&pattern, "path default must be a scalar")),
            }
        }

        // Stable lookup order for reverse(): first declared alphabetically
        for names in map.physical_index.values_mut() {
            names.sort();
        }

        map
    }

    fn insert(&mut self, descriptor: TagDescriptor) {
        if let ScalingKind::Unknown(kind) = &descriptor.scaling {
            self.issues.push(LoadIssue::new(
                &descriptor.name,
                format!("unknown scaling kind '{kind}', values pass through unchanged"),
            ));
        }
        if let Some(physical) = &descriptor.physical {
            self.physical_index
                .entry(physical.clone())
                .or_default()
                .push(descriptor.name.clone());
        }
        self.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Physical register behind a symbolic tag; `None` for unknown or internal tags.
    pub fn resolve(&self, symbolic: &str) -> Option<&str> {
        self.descriptors.get(symbolic)?.physical.as_deref()
    }

    /// First symbolic name declaring the physical register.
    pub fn reverse(&self, physical: &str) -> Option<&str> {
        self.physical_index
            .get(physical)
            .and_then(|names| names.first())
            .map(String::as_str)
    }

    /// Every symbolic name declaring the physical register.
    pub fn symbolic_names(&self, physical: &str) -> &[String] {
        self.physical_index
            .get(physical)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn describe(&self, symbolic: &str) -> Option<&TagDescriptor> {
        self.descriptors.get(symbolic)
    }

    /// Whether `name` is known as either a symbolic or a physical tag.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name) || self.physical_index.contains_key(name)
    }

    pub fn scale(&self, symbolic: &str, raw: &TagValue) -> Result<TagValue> {
        self.describe(symbolic)
            .ok_or_else(|| DomainError::NotMapped(symbolic.to_string()))?
            .scale(raw)
    }

    pub fn unscale(&self, symbolic: &str, value: &TagValue) -> Result<TagValue> {
        self.describe(symbolic)
            .ok_or_else(|| DomainError::NotMapped(symbolic.to_string()))?
            .unscale(value)
    }

    /// Seed value for an internal tag: its own default, else the first matching path default.
    pub fn default_for(&self, symbolic: &str) -> Option<TagValue> {
        if let Some(value) = self.describe(symbolic).and_then(|d| d.default.clone()) {
            return Some(value);
        }
        self.path_defaults
            .iter()
            .find(|p| p.matches(symbolic))
            .map(|p| p.value.clone())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TagDescriptor> {
        self.descriptors.values()
    }

    pub fn physical_names(&self) -> impl Iterator<Item = &str> {
        self.physical_index.keys().map(String::as_str)
    }

    pub fn issues(&self) -> &[LoadIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
