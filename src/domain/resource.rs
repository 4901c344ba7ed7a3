// Copyright (c) 2025 - Cowboy AI, Inc.
//! Declared Resources and the Deployment Arena
//!
//! A deployment is an arena of declared resources indexed by id. Attribute
//! values are a sum type over literals and reference expressions; references
//! are recorded verbatim at declare time and dereferenced only during apply,
//! once the referenced resource has published its applied attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::domain::invariants;
use crate::domain::kind::ResourceKind;
use crate::errors::{DeploymentError, DeploymentResult};

/// Resource identifier, unique within one deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a new resource id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Attribute value: either a literal or a reference expression
///
/// A reference expression (`resource_id.attribute_path`) names another
/// resource's applied attribute. It is never dereferenced at declare time;
/// the apply engine resolves it against the applied-state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttrValue {
    /// Inline value, known at declare time
    Literal { value: Value },

    /// Deferred lookup of another resource's applied attribute
    Reference { resource: ResourceId, path: String },
}

impl AttrValue {
    /// Create a literal attribute value
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    /// Create a reference to another resource's applied attribute
    pub fn reference(resource: impl Into<ResourceId>, path: impl Into<String>) -> Self {
        Self::Reference {
            resource: resource.into(),
            path: path.into(),
        }
    }

    /// Parse a `resource_id.attribute_path` expression
    pub fn parse_reference(expr: &str) -> Option<Self> {
        let (resource, path) = expr.split_once('.')?;
        if resource.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self::reference(resource, path))
    }

    /// Get the literal value, if this is a literal
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal { value } => Some(value),
            Self::Reference { .. } => None,
        }
    }

    /// Get the literal as a string slice, if it is a string literal
    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(Value::as_str)
    }

    /// Get the referenced resource id, if this is a reference
    pub fn reference_target(&self) -> Option<&ResourceId> {
        match self {
            Self::Literal { .. } => None,
            Self::Reference { resource, .. } => Some(resource),
        }
    }

    /// Render the expression form (`resource.path`) of a reference
    pub fn expression(&self) -> Option<String> {
        match self {
            Self::Literal { .. } => None,
            Self::Reference { resource, path } => Some(format!("{resource}.{path}")),
        }
    }
}

/// A typed, identified unit of declared infrastructure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Identifier, unique within the deployment
    pub id: ResourceId,

    /// Kind from the closed taxonomy
    pub kind: ResourceKind,

    /// Declared attributes (literal or reference)
    pub attributes: BTreeMap<String, AttrValue>,

    /// Declaration order, used as the deterministic ordering tie-break
    pub index: usize,
}

impl Resource {
    /// Resource ids this resource references, derived from its attributes
    pub fn depends_on(&self) -> BTreeSet<ResourceId> {
        self.attributes
            .values()
            .filter_map(AttrValue::reference_target)
            .cloned()
            .collect()
    }

    /// Get a declared attribute
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Get a declared literal string attribute
    pub fn literal_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttrValue::as_str)
    }
}

/// The declarative input surface: every resource of one deployment
///
/// Resources live in an arena ordered by declaration; ids index into it.
/// `declare` is the only way in, so every resource in the arena has passed
/// the per-kind attribute validation.
#[derive(Debug, Clone, Default)]
pub struct Deployment {
    resources: Vec<Resource>,
    by_id: HashMap<ResourceId, usize>,
}

impl Deployment {
    /// Create an empty deployment
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource
    ///
    /// Fails with `InvalidAttribute` when a required attribute for `kind` is
    /// absent or malformed, and with `DuplicateId` when the id collides with
    /// an earlier declaration. References are recorded, not checked, here;
    /// the graph builder verifies they name declared resources.
    pub fn declare<S, I>(
        &mut self,
        id: impl Into<ResourceId>,
        kind: ResourceKind,
        attributes: I,
    ) -> DeploymentResult<ResourceId>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, AttrValue)>,
    {
        let id = id.into();
        if self.by_id.contains_key(&id) {
            return Err(DeploymentError::DuplicateId(id));
        }

        let attributes: BTreeMap<String, AttrValue> = attributes
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        let resource = Resource {
            id: id.clone(),
            kind,
            attributes,
            index: self.resources.len(),
        };

        invariants::validate_declaration(&resource, &self.resources)?;

        self.by_id.insert(id.clone(), resource.index);
        self.resources.push(resource);
        Ok(id)
    }

    /// Look up a resource by id
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.by_id.get(id).map(|&idx| &self.resources[idx])
    }

    /// Arena index of a resource id
    pub fn index_of(&self, id: &ResourceId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// All resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Resources of one kind, in declaration order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether nothing has been declared
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
