// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Reference Resolution
//!
//! Resolves a resource's declared attributes against the applied-state
//! store: literals pass through, reference expressions become the
//! referenced resource's applied attribute value. Resolution is a pure
//! function of (resource, applied state), so it is testable without any
//! provisioning call.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::apply::state::AppliedSet;
use crate::domain::{AttrValue, Resource};
use crate::errors::{DeploymentError, DeploymentResult};

/// Resolve every attribute of `resource` against already-applied state
///
/// Fails with `UnresolvedReference` when a referenced resource has no
/// applied record — impossible under a correct topological order, and
/// treated as an engine bug by the caller — and `UnknownAttributePath`
/// when the record exists but the path names nothing in it.
pub fn resolve_attributes(
    resource: &Resource,
    applied: &AppliedSet,
) -> DeploymentResult<BTreeMap<String, Value>> {
    let mut resolved = BTreeMap::new();

    for (name, value) in &resource.attributes {
        let concrete = match value {
            AttrValue::Literal { value } => value.clone(),
            AttrValue::Reference { resource: target, path } => {
                let attrs = applied.attributes(target).ok_or_else(|| {
                    DeploymentError::UnresolvedReference {
                        resource: resource.id.clone(),
                        expression: format!("{target}.{path}"),
                    }
                })?;
                lookup_path(attrs, path)
                    .ok_or_else(|| DeploymentError::UnknownAttributePath {
                        resource: resource.id.clone(),
                        expression: format!("{target}.{path}"),
                    })?
                    .clone()
            }
        };
        resolved.insert(name.clone(), concrete);
    }

    Ok(resolved)
}

/// Navigate a dot path through an attribute map
///
/// The whole path is tried as a flat key first, then segment by segment
/// through nested objects.
pub fn lookup_path<'a>(attrs: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = attrs.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = attrs.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
