//! The `Database` resource.

use crate::meta::{ListMeta, ObjectKey, ObjectMeta, TypeMeta};
use serde::{Deserialize, Serialize};

/// API group of the resource.
pub const GROUP: &str = "resource.donald.com";
/// API version within the group.
pub const VERSION: &str = "v1";
/// Kind of a single object.
pub const KIND: &str = "Database";
/// Kind of a list response.
pub const LIST_KIND: &str = "DatabaseList";
/// Plural resource name used in paths.
pub const PLURAL: &str = "databases";
/// Path prefix for API groups.
pub const API_PATH: &str = "/apis";

/// Returns `group/version`.
pub fn api_version() -> String {
    format!("{}/{}", GROUP, VERSION)
}

/// Desired state of a database entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database name.
    #[serde(default)]
    pub db_name: String,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Total capacity.
    #[serde(default)]
    pub total: i64,
    /// Available capacity.
    #[serde(default)]
    pub available: i64,
    /// Type tag (e.g. `SQL`, `noSQL`).
    #[serde(default)]
    pub db_type: String,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
}

/// A database object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    /// `apiVersion` and `kind`.
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: DatabaseSpec,
}

impl Database {
    /// Creates a cluster-scoped database object with type metadata filled in.
    pub fn new(name: impl Into<String>, spec: DatabaseSpec) -> Self {
        Self {
            type_meta: TypeMeta::new(api_version(), KIND),
            metadata: ObjectMeta::named(name),
            spec,
        }
    }

    /// Places the object in a namespace.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.metadata.namespace = Some(namespace.into());
        self
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the object name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the object identity.
    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

/// Response of a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseList {
    /// `apiVersion` and `kind`.
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    /// List metadata, including the collection resource version.
    #[serde(default)]
    pub metadata: ListMeta,
    /// Items in no particular order.
    #[serde(default)]
    pub items: Vec<Database>,
}

impl DatabaseList {
    /// Creates a list with type metadata filled in.
    pub fn new(items: Vec<Database>, metadata: ListMeta) -> Self {
        Self {
            type_meta: TypeMeta::new(api_version(), LIST_KIND),
            metadata,
            items,
        }
    }
}
