use std::fmt;

use crate::error::{DomainError, Result};

/// A tag or fact reference inside a rule, possibly with `{a|b}` alternatives.
///
/// `feeders.feeder{1|2}.running` expands to the variants
/// `feeders.feeder1.running` and `feeders.feeder2.running`, which are tried
/// in that order at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagRef {
    pattern: String,
    variants: Vec<String>,
}

impl TagRef {
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(DomainError::Config("Empty tag reference".to_string()));
        }
        let variants = expand(pattern)?;
        Ok(Self {
            pattern: pattern.to_string(),
            variants,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Concrete names in resolution order
    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    pub fn is_wildcard(&self) -> bool {
        self.variants.len() > 1
    }
}

impl fmt::Display for TagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

fn expand(pattern: &str) -> Result<Vec<String>> {
    let Some(open) = pattern.find('{') else {
        if pattern.contains('}') || pattern.contains('|') {
            return Err(DomainError::Config(format!(
                "Unbalanced wildcard in reference '{pattern}'"
            )));
        }
        return Ok(vec![pattern.to_string()]);
    };

    let close = pattern[open..]
        .find('}')
        .map(|i| open + i)
        .ok_or_else(|| DomainError::Config(format!("Unclosed wildcard in reference '{pattern}'")))?;

    let prefix = &pattern[..open];
    if prefix.contains('}') || prefix.contains('|') {
        return Err(DomainError::Config(format!(
            "Unbalanced wildcard in reference '{pattern}'"
        )));
    }

    let inner = &pattern[open + 1..close];
    if inner.contains('{') {
        return Err(DomainError::Config(format!(
            "Nested wildcard in reference '{pattern}'"
        )));
    }
    let alternatives: Vec<&str> = inner.split('|').map(str::trim).collect();
    if alternatives.iter().any(|a| a.is_empty()) {
        return Err(DomainError::Config(format!(
            "Empty wildcard alternative in reference '{pattern}'"
        )));
    }

    let suffixes = expand_suffix(&pattern[close + 1..])?;
    let mut variants = Vec::with_capacity(alternatives.len() * suffixes.len());
    for alternative in alternatives {
        for suffix in &suffixes {
            variants.push(format!("{prefix}{alternative}{suffix}"));
        }
    }
    Ok(variants)
}

fn expand_suffix(rest: &str) -> Result<Vec<String>> {
    if rest.is_empty() {
        Ok(vec![String::new()])
    } else {
        expand(rest)
    }
}
