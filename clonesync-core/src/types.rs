//! Domain types for templates, cloned instances, and their lineage.
//!
//! All types are serializable/deserializable via serde + serde_yaml using
//! camelCase field names, matching the manifests kept in the object store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Annotation written by the cloning process: name of the source template.
pub const CLONED_FROM_NAME_ANNOTATION: &str = "cluster.x-k8s.io/cloned-from-name";

/// Annotation written by the cloning process: `Kind.group` of the source template.
pub const CLONED_FROM_GROUP_KIND_ANNOTATION: &str = "cluster.x-k8s.io/cloned-from-groupkind";

/// API group shared by templates and instances.
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";

pub const TEMPLATE_KIND: &str = "MachineTemplate";
pub const INSTANCE_KIND: &str = "Machine";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed object name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectName(pub String);

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ObjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The partition that templates and their instances share.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(pub String);

impl Namespace {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Canonical `Kind.group` string, compared by exact equality.
///
/// Cluster API's own template controller compares the annotation against the
/// template's API group alone; here the kind is part of the identity, so an
/// instance annotated with a bare group does not match a `Kind.group` template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKind(pub String);

impl GroupKind {
    /// `MachineTemplate` + `infrastructure.cluster.x-k8s.io` →
    /// `MachineTemplate.infrastructure.cluster.x-k8s.io`.
    pub fn from_parts(kind: &str, group: &str) -> Self {
        if group.is_empty() {
            return Self(kind.to_owned());
        }
        Self(format!("{kind}.{group}"))
    }

    /// Group/kind every template carries unless its manifest says otherwise.
    pub fn template_default() -> Self {
        Self::from_parts(TEMPLATE_KIND, INFRASTRUCTURE_GROUP)
    }
}

impl Default for GroupKind {
    fn default() -> Self {
        Self::template_default()
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GroupKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GroupKind {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// `namespace/name` address of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: Namespace,
    pub name: ObjectName,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<Namespace>, name: impl Into<ObjectName>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A single path component: non-empty, no `/`, not `.` or `..`.
fn is_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains('/') && s != "." && s != ".."
}

impl FromStr for ObjectKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if is_segment(ns) && is_segment(name) => Ok(Self::new(ns, name)),
            _ => Err(format!("invalid object key '{s}'; expected <namespace>/<name>")),
        }
    }
}

// ---------------------------------------------------------------------------
// Object metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: ObjectName,
    pub namespace: Namespace,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<Namespace>, name: impl Into<ObjectName>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            annotations: BTreeMap::new(),
            resource_version: 0,
            creation_timestamp: None,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lineage
// ---------------------------------------------------------------------------

/// Which template an instance was cloned from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lineage {
    pub source_name: ObjectName,
    pub source_group_kind: GroupKind,
}

impl Lineage {
    pub fn new(source_name: impl Into<ObjectName>, source_group_kind: impl Into<GroupKind>) -> Self {
        Self {
            source_name: source_name.into(),
            source_group_kind: source_group_kind.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    #[serde(default)]
    pub disable_automated_clean: bool,
}

/// The authoritative resource whose field propagates to its clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub group_kind: GroupKind,
    #[serde(default)]
    pub spec: TemplateSpec,
}

impl Template {
    pub fn new(namespace: impl Into<Namespace>, name: impl Into<ObjectName>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            group_kind: GroupKind::template_default(),
            spec: TemplateSpec::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// The lineage an instance must carry to count as a clone of this template.
    pub fn identity(&self) -> Lineage {
        Lineage {
            source_name: self.metadata.name.clone(),
            source_group_kind: self.group_kind.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    #[serde(default)]
    pub disable_automated_clean: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// A resource cloned from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: InstanceSpec,
}

impl Instance {
    pub fn new(namespace: impl Into<Namespace>, name: impl Into<ObjectName>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: InstanceSpec::default(),
        }
    }

    /// Record the clone source, as the cloning process does at creation time.
    pub fn with_lineage(mut self, lineage: &Lineage) -> Self {
        self.metadata.annotations.insert(
            CLONED_FROM_NAME_ANNOTATION.to_owned(),
            lineage.source_name.0.clone(),
        );
        self.metadata.annotations.insert(
            CLONED_FROM_GROUP_KIND_ANNOTATION.to_owned(),
            lineage.source_group_kind.0.clone(),
        );
        self
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    /// Typed view of the lineage annotations.
    ///
    /// `None` unless both annotations are present and non-empty.
    pub fn lineage(&self) -> Option<Lineage> {
        let annotations = &self.metadata.annotations;
        let name = annotations.get(CLONED_FROM_NAME_ANNOTATION)?;
        let group_kind = annotations.get(CLONED_FROM_GROUP_KIND_ANNOTATION)?;
        if name.is_empty() || group_kind.is_empty() {
            return None;
        }
        Some(Lineage::new(name.as_str(), group_kind.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
