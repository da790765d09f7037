//! Kind-agnostic handle for cluster objects.
//!
//! The existence guard and the owner resolver only need group/version/kind,
//! name, namespace and owner references, so every object kind is carried
//! through the same structure instead of per-kind generated types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coordinates of a cluster object: `(apiVersion, kind, namespace, name)`.
///
/// Cluster-scoped objects carry an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
        }
    }
}

/// An owner reference as found in `metadata.ownerReferences`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub controller: bool,
}

/// Object metadata subset used for ownership walks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

/// A structured, loosely-typed cluster object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    /// Everything else (spec, status, ...), untouched.
    #[serde(default, flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl DynamicObject {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..ObjectMeta::default()
            },
            data: serde_json::Map::new(),
        }
    }

    /// Append an owner reference (builder style, mostly for fixtures).
    pub fn owned_by(mut self, owner: &DynamicObject, controller: bool) -> Self {
        self.metadata.owner_references.push(OwnerReference {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.metadata.name.clone(),
            uid: owner.metadata.uid.clone(),
            controller,
        });
        self
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(
            self.api_version.clone(),
            self.kind.clone(),
            self.metadata.namespace.clone(),
            self.metadata.name.clone(),
        )
    }

    /// The managing controller, falling back to the first owner listed.
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        let owners = &self.metadata.owner_references;
        owners
            .iter()
            .find(|o| o.controller)
            .or_else(|| owners.first())
    }

    /// Reference to an owner, resolved in this object's namespace.
    pub fn owner_ref(&self, owner: &OwnerReference) -> ObjectRef {
        ObjectRef::new(
            owner.api_version.clone(),
            owner.kind.clone(),
            self.metadata.namespace.clone(),
            owner.name.clone(),
        )
    }
}
