use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{DEFAULT_NAMESPACE, Labels};

/// Reference from a dependent object to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Kind of the owner (e.g. `ScheduledEvent`).
    pub kind: String,
    /// Name of the owner.
    pub name: String,
    /// Uid of the owner; distinguishes a re-created owner with the same name.
    pub uid: Uuid,
    /// The owner is the managing controller of this object.
    #[serde(default)]
    pub controller: bool,
}

/// Metadata carried by every stored object.
///
/// `uid`, `resource_version` and `creation_timestamp` are assigned by the store;
/// callers leave them at their defaults on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "Uuid::nil")]
    pub uid: Uuid,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub creation_timestamp: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deletion_timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub annotations: Labels,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: default_namespace(),
            uid: Uuid::nil(),
            resource_version: 0,
            creation_timestamp: None,
            deletion_timestamp: None,
            owner_references: Vec::new(),
            labels: Labels::new(),
            annotations: Labels::new(),
        }
    }
}

impl ObjectMeta {
    /// Metadata for a new object with the given name in the default namespace.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Replace the namespace.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replace the labels.
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    /// Append an owner reference.
    pub fn owned_by(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }

    /// Queue key of this object: `namespace/name`.
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }

    /// Returns `true` if one of the owner references points at `uid`.
    pub fn is_owned_by(&self, uid: Uuid) -> bool {
        self.owner_references.iter().any(|o| o.uid == uid)
    }

    /// Name of the first owner of the given kind.
    pub fn owner_of_kind(&self, kind: &str) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|o| o.kind == kind)
    }

    /// Creation time as Unix seconds (0 when unset).
    pub fn creation_unix(&self) -> i64 {
        self.creation_timestamp
            .map(|t| t.unix_timestamp())
            .unwrap_or(0)
    }
}

/// Build a `namespace/name` key.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Split a `namespace/name` key.
///
/// A key without a separator is treated as a bare name in the default namespace.
pub fn split_key(key: &str) -> (&str, &str) {
    match key.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => (DEFAULT_NAMESPACE, key),
    }
}
