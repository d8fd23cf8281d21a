//! Equality-based label selectors.

use crate::error::{CodecError, CodecResult};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single selector term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `key=value` or `key==value`.
    Equals(String, String),
    /// `key!=value` (also matches objects without the key).
    NotEquals(String, String),
    /// `key`.
    Exists(String),
    /// `!key`.
    DoesNotExist(String),
}

impl Requirement {
    /// Checks the requirement against a label set.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals(k, v) => write!(f, "{}={}", k, v),
            Requirement::NotEquals(k, v) => write!(f, "{}!={}", k, v),
            Requirement::Exists(k) => f.write_str(k),
            Requirement::DoesNotExist(k) => write!(f, "!{}", k),
        }
    }
}

/// A conjunction of requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Selector that matches every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parses a selector such as `tier=gold,env!=dev,!legacy`.
    pub fn parse(text: &str) -> CodecResult<Self> {
        let mut requirements = Vec::new();
        for term in text.split(',').map(str::trim) {
            if term.is_empty() {
                if text.trim().is_empty() {
                    continue;
                }
                return Err(CodecError::invalid_selector(text, "empty term"));
            }
            requirements.push(parse_term(text, term)?);
        }
        Ok(Self { requirements })
    }

    /// Returns the parsed terms.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Returns true if every requirement holds for `labels`.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for LabelSelector {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}

fn parse_term(selector: &str, term: &str) -> CodecResult<Requirement> {
    let requirement = if let Some((key, value)) = term.split_once("!=") {
        Requirement::NotEquals(key.trim().to_string(), value.trim().to_string())
    } else if let Some((key, value)) = term.split_once("==") {
        Requirement::Equals(key.trim().to_string(), value.trim().to_string())
    } else if let Some((key, value)) = term.split_once('=') {
        Requirement::Equals(key.trim().to_string(), value.trim().to_string())
    } else if let Some(key) = term.strip_prefix('!') {
        Requirement::DoesNotExist(key.trim().to_string())
    } else {
        Requirement::Exists(term.to_string())
    };

    let key = match &requirement {
        Requirement::Equals(k, _)
        | Requirement::NotEquals(k, _)
        | Requirement::Exists(k)
        | Requirement::DoesNotExist(k) => k,
    };
    if !valid_label_key(key) {
        return Err(CodecError::invalid_selector(
            selector,
            format!("invalid key {:?}", key),
        ));
    }
    Ok(requirement)
}

fn valid_label_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}
