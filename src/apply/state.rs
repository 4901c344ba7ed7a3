// Copyright (c) 2025 - Cowboy AI, Inc.
//! Applied-State Store
//!
//! The record of what actually exists on the provider side, keyed by
//! resource id. The apply engine is the only writer; a record is published
//! here only once its resource's step has fully completed, so dependents
//! always read finished state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::domain::{ResourceId, ResourceKind};

/// Applied state of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedResource {
    /// Resource this record belongs to
    pub resource: ResourceId,

    /// Kind at the time of apply
    pub kind: ResourceKind,

    /// Resolved desired attributes at the last successful apply; compared
    /// against the freshly resolved attributes to detect no-ops
    pub desired: BTreeMap<String, Value>,

    /// Concrete attributes, including provider-assigned identifiers and
    /// generated credentials
    pub attributes: BTreeMap<String, Value>,

    /// When the record was last written
    pub applied_at: DateTime<Utc>,
}

impl AppliedResource {
    /// Get a concrete attribute value
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get a concrete attribute as a string slice
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

/// All applied resources of one deployment
///
/// Starts each pass as a copy of the previous pass's result; records are
/// overwritten as steps complete. Resources that fail or are skipped keep
/// their previous record, because that is still what exists remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedSet {
    records: HashMap<ResourceId, AppliedResource>,
}

impl AppliedSet {
    /// Create an empty set (first deployment pass)
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a resource's applied record
    pub fn get(&self, id: &ResourceId) -> Option<&AppliedResource> {
        self.records.get(id)
    }

    /// Concrete attributes of an applied resource
    pub fn attributes(&self, id: &ResourceId) -> Option<&BTreeMap<String, Value>> {
        self.records.get(id).map(|r| &r.attributes)
    }

    /// Whether the resource has an applied record
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.records.contains_key(id)
    }

    /// Publish a completed record, replacing any previous one
    pub fn publish(&mut self, record: AppliedResource) {
        self.records.insert(record.resource.clone(), record);
    }

    /// Iterate all records
    pub fn iter(&self) -> impl Iterator<Item = &AppliedResource> {
        self.records.values()
    }

    /// Number of applied records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been applied
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> AppliedResource {
        AppliedResource {
            resource: id.into(),
            kind: ResourceKind::NetworkSegment,
            desired: BTreeMap::from([("cidr".to_string(), json!("10.0.0.0/24"))]),
            attributes: BTreeMap::from([
                ("cidr".to_string(), json!("10.0.0.0/24")),
                ("segment_id".to_string(), json!("subnet-0001")),
            ]),
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_publish_and_get() {
        let mut set = AppliedSet::new();
        assert!(!set.contains(&"seg".into()));

        set.publish(record("seg"));
        assert!(set.contains(&"seg".into()));
        assert_eq!(
            set.get(&"seg".into()).unwrap().attribute_str("segment_id"),
            Some("subnet-0001")
        );
    }

    #[test]
    fn test_publish_replaces() {
        let mut set = AppliedSet::new();
        set.publish(record("seg"));

        let mut updated = record("seg");
        updated
            .attributes
            .insert("segment_id".to_string(), json!("subnet-0002"));
        set.publish(updated);

        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(&"seg".into()).unwrap().attribute_str("segment_id"),
            Some("subnet-0002")
        );
    }
}
