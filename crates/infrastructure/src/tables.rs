use std::fs;
use std::path::{Path, PathBuf};

use domain::rule::{RawRuleTable, RuleTableSource};
use domain::tag::{RawTagTable, TagTableSource};
use domain::{DomainError, Result};
use serde::de::DeserializeOwned;
use tracing::info;

fn read_table<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| {
        DomainError::Config(format!("Cannot read {what} {}: {e}", path.display()))
    })?;
    let table = serde_json::from_str(&text).map_err(|e| {
        DomainError::Config(format!("Cannot parse {what} {}: {e}", path.display()))
    })?;
    info!(path = %path.display(), "📂 Loaded {what}");
    Ok(table)
}

/// Tag-definition table stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonTagTable {
    path: PathBuf,
}

impl JsonTagTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TagTableSource for JsonTagTable {
    fn load_tag_table(&self) -> Result<RawTagTable> {
        read_table(&self.path, "tag table")
    }
}

/// Rule-definition table stored as a JSON file
#[derive(Debug, Clone)]
pub struct JsonRuleTable {
    path: PathBuf,
}

impl JsonRuleTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleTableSource for JsonRuleTable {
    fn load_rule_table(&self) -> Result<RawRuleTable> {
        read_table(&self.path, "rule table")
    }
}
