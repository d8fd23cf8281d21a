//! Request options and their query-string encoding.

use crate::error::{CodecError, CodecResult};
use crate::meta::ResourceVersion;
use std::fmt;
use std::str::FromStr;

/// Options for list and watch calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Label selector, e.g. `tier=gold,env!=dev`.
    pub label_selector: Option<String>,
    /// Field selector, passed through to the server.
    pub field_selector: Option<String>,
    /// For list: minimum version to serve. For watch: start after this version.
    pub resource_version: Option<ResourceVersion>,
    /// Server-side timeout for the call (watch streams close after it).
    pub timeout_seconds: Option<u64>,
    /// Maximum number of items in one list page.
    pub limit: Option<u64>,
    /// Continuation token from a previous page.
    pub continue_token: Option<String>,
    /// Turns a list into a watch.
    pub watch: bool,
}

impl ListOptions {
    /// Sets the label selector.
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    /// Sets the field selector.
    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    /// Sets the resource version.
    pub fn at(mut self, version: impl Into<ResourceVersion>) -> Self {
        self.resource_version = Some(version.into());
        self
    }

    /// Sets the server-side timeout.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Sets the page size.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Encodes as query pairs.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(ref selector) = self.label_selector {
            pairs.push(("labelSelector".to_string(), selector.clone()));
        }
        if let Some(ref selector) = self.field_selector {
            pairs.push(("fieldSelector".to_string(), selector.clone()));
        }
        if let Some(ref version) = self.resource_version {
            pairs.push(("resourceVersion".to_string(), version.to_string()));
        }
        if let Some(seconds) = self.timeout_seconds {
            pairs.push(("timeoutSeconds".to_string(), seconds.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(ref token) = self.continue_token {
            pairs.push(("continue".to_string(), token.clone()));
        }
        if self.watch {
            pairs.push(("watch".to_string(), "true".to_string()));
        }
        pairs
    }

    /// Decodes from query pairs. Unknown parameters are ignored.
    pub fn from_query(pairs: &[(String, String)]) -> CodecResult<Self> {
        let mut options = Self::default();
        for (name, value) in pairs {
            match name.as_str() {
                "labelSelector" => options.label_selector = non_empty(value),
                "fieldSelector" => options.field_selector = non_empty(value),
                "resourceVersion" => {
                    options.resource_version = non_empty(value).map(ResourceVersion::from)
                }
                "timeoutSeconds" => options.timeout_seconds = Some(parse_number(name, value)?),
                "limit" => options.limit = Some(parse_number(name, value)?),
                "continue" => options.continue_token = non_empty(value),
                "watch" => options.watch = parse_bool(name, value)?,
                _ => {}
            }
        }
        Ok(options)
    }
}

/// Options for get calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Serve a version at least this recent.
    pub resource_version: Option<ResourceVersion>,
}

impl GetOptions {
    /// Encodes as query pairs.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.resource_version
            .iter()
            .map(|v| ("resourceVersion".to_string(), v.to_string()))
            .collect()
    }
}

/// How dependents of a deleted object are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationPolicy {
    /// Leave dependents alone.
    Orphan,
    /// Delete dependents in the background.
    Background,
    /// Delete dependents before the owner.
    Foreground,
}

impl fmt::Display for PropagationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PropagationPolicy::Orphan => "Orphan",
            PropagationPolicy::Background => "Background",
            PropagationPolicy::Foreground => "Foreground",
        })
    }
}

impl FromStr for PropagationPolicy {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Orphan" => Ok(PropagationPolicy::Orphan),
            "Background" => Ok(PropagationPolicy::Background),
            "Foreground" => Ok(PropagationPolicy::Foreground),
            other => Err(CodecError::invalid_query("propagationPolicy", other)),
        }
    }
}

/// Options for delete calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Grace period before the object is removed.
    pub grace_period_seconds: Option<i64>,
    /// Dependent handling.
    pub propagation_policy: Option<PropagationPolicy>,
}

impl DeleteOptions {
    /// Encodes as query pairs.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(seconds) = self.grace_period_seconds {
            pairs.push(("gracePeriodSeconds".to_string(), seconds.to_string()));
        }
        if let Some(policy) = self.propagation_policy {
            pairs.push(("propagationPolicy".to_string(), policy.to_string()));
        }
        pairs
    }

    /// Decodes from query pairs. Unknown parameters are ignored.
    pub fn from_query(pairs: &[(String, String)]) -> CodecResult<Self> {
        let mut options = Self::default();
        for (name, value) in pairs {
            match name.as_str() {
                "gracePeriodSeconds" => {
                    options.grace_period_seconds = Some(parse_number(name, value)?)
                }
                "propagationPolicy" => options.propagation_policy = Some(value.parse()?),
                _ => {}
            }
        }
        Ok(options)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_number<N: FromStr>(name: &str, value: &str) -> CodecResult<N> {
    value
        .parse()
        .map_err(|_| CodecError::invalid_query(name, value))
}

fn parse_bool(name: &str, value: &str) -> CodecResult<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(CodecError::invalid_query(name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    #[test]
    fn list_options_query() {
        let mut options = ListOptions::default().labels("tier=gold").at("42").timeout(300);
        options.watch = true;

        let query = options.to_query();
        assert_eq!(
            query,
            vec![
                pair("labelSelector", "tier=gold"),
                pair("resourceVersion", "42"),
                pair("timeoutSeconds", "300"),
                pair("watch", "true"),
            ]
        );
        assert_eq!(ListOptions::from_query(&query).unwrap(), options);
    }

    #[test]
    fn empty_list_options_have_no_query() {
        assert!(ListOptions::default().to_query().is_empty());
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = ListOptions::from_query(&[pair("limit", "many")]).unwrap_err();
        assert_eq!(err, CodecError::invalid_query("limit", "many"));
    }

    #[test]
    fn empty_resource_version_means_none() {
        let options = ListOptions::from_query(&[pair("resourceVersion", "")]).unwrap();
        assert_eq!(options.resource_version, None);
    }

    #[test]
    fn delete_options_query() {
        let options = DeleteOptions {
            grace_period_seconds: Some(0),
            propagation_policy: Some(PropagationPolicy::Foreground),
        };
        let query = options.to_query();
        assert_eq!(DeleteOptions::from_query(&query).unwrap(), options);
        assert!(DeleteOptions::from_query(&[pair("propagationPolicy", "Later")]).is_err());
    }
}
