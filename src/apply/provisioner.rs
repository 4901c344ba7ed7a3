// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioner Seam
//!
//! The only boundary between the apply engine and whatever actually
//! creates infrastructure. A call may block on a remote control plane; the
//! engine treats it as a suspension point and keeps applying independent
//! branches meanwhile.
//!
//! `InMemoryProvisioner` is the in-process implementation used by tests
//! and dry runs: it fabricates provider-assigned identifiers with a
//! monotonic sequence, so any unwanted regeneration (of a credential, an
//! endpoint, an id) shows up as a changed value.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::domain::{ResourceId, ResourceKind};

/// Provisioning failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// The provider rejected the desired state
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    /// The provider could not be reached or timed out
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Create-or-update seam toward the provider
///
/// Implementations must be idempotent per resource id: the engine decides
/// *whether* to call, the provisioner decides *how*.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create a resource that has no applied record yet.
    ///
    /// Returns the concrete attributes: the resolved desired attributes
    /// plus whatever the provider assigned (identifiers, endpoints,
    /// generated credentials).
    async fn create(
        &self,
        resource: &ResourceId,
        kind: ResourceKind,
        desired: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ProvisionError>;

    /// Update a resource whose desired state drifted from `current`.
    ///
    /// Provider-assigned values in `current` that the update does not
    /// replace must be carried through unchanged.
    async fn update(
        &self,
        resource: &ResourceId,
        kind: ResourceKind,
        desired: &BTreeMap<String, Value>,
        current: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ProvisionError>;
}

/// In-process provisioner backed by a monotonic sequence
#[derive(Debug, Default)]
pub struct InMemoryProvisioner {
    seq: AtomicU64,
    creates: AtomicU64,
    updates: AtomicU64,
}

impl InMemoryProvisioner {
    /// Create a fresh provisioner
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create calls served
    pub fn create_calls(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of update calls served
    pub fn update_calls(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    fn next(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn generated(
        &self,
        resource: &ResourceId,
        kind: ResourceKind,
        desired: &BTreeMap<String, Value>,
    ) -> BTreeMap<String, Value> {
        let seq = self.next();
        let tag = seq.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        let mut attrs = BTreeMap::new();

        match kind {
            ResourceKind::NetworkSegment => {
                attrs.insert("segment_id".to_string(), json!(format!("subnet-{seq:08x}")));
            }
            ResourceKind::SecurityRule => {
                attrs.insert("rule_id".to_string(), json!(format!("sgr-{seq:08x}")));
            }
            ResourceKind::ComputeService => {
                attrs.insert("service_id".to_string(), json!(format!("svc-{seq:08x}")));
                attrs.insert(
                    "private_ip".to_string(),
                    json!(format!("10.0.{}.{}", seq % 250, (seq * 7) % 250)),
                );
                attrs.insert(
                    "public_ip".to_string(),
                    json!(format!("203.0.113.{}", (seq % 200) + 10)),
                );
            }
            ResourceKind::DataStore => {
                let engine = desired.get("engine").and_then(Value::as_str).unwrap_or("mysql");
                let port = match engine {
                    "postgres" => 5432,
                    _ => 3306,
                };
                attrs.insert("store_id".to_string(), json!(format!("db-{seq:08x}")));
                attrs.insert(
                    "endpoint_host".to_string(),
                    json!(format!("{resource}-{tag:016x}.db.internal")),
                );
                attrs.insert("endpoint_port".to_string(), json!(port));
                let username = desired
                    .get("master_username")
                    .and_then(Value::as_str)
                    .unwrap_or("admin");
                attrs.insert("master_username".to_string(), json!(username));
                attrs.insert(
                    "master_password".to_string(),
                    json!(format!("gen-{tag:016x}")),
                );
                attrs.insert(
                    "secret_ref".to_string(),
                    json!(format!("secret/{resource}-{seq:04x}")),
                );
            }
            ResourceKind::LoadBalancer => {
                attrs.insert(
                    "load_balancer_id".to_string(),
                    json!(format!("lb-{seq:08x}")),
                );
                attrs.insert(
                    "dns_name".to_string(),
                    json!(format!("{resource}-{tag:016x}.lb.internal")),
                );
                let action = match desired.get("target_service") {
                    Some(service) => format!("forward:{}", service.as_str().unwrap_or("?")),
                    None => {
                        let status = desired
                            .get("default_action_status")
                            .and_then(Value::as_u64)
                            .unwrap_or(404);
                        format!("fixed-response:{status}")
                    }
                };
                attrs.insert("default_action".to_string(), json!(action));
            }
            ResourceKind::Output => {}
        }

        attrs
    }
}

#[async_trait]
impl Provisioner for InMemoryProvisioner {
    async fn create(
        &self,
        resource: &ResourceId,
        kind: ResourceKind,
        desired: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ProvisionError> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        let mut attrs = desired.clone();
        attrs.extend(self.generated(resource, kind, desired));
        Ok(attrs)
    }

    async fn update(
        &self,
        _resource: &ResourceId,
        kind: ResourceKind,
        desired: &BTreeMap<String, Value>,
        current: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ProvisionError> {
        self.updates.fetch_add(1, Ordering::SeqCst);

        // Provider-assigned values survive the update; only the desired
        // attributes move.
        let mut attrs = current.clone();
        for (name, value) in desired {
            attrs.insert(name.clone(), value.clone());
        }

        // A forward override can appear on update too
        if kind == ResourceKind::LoadBalancer {
            if let Some(service) = desired.get("target_service") {
                attrs.insert(
                    "default_action".to_string(),
                    json!(format!("forward:{}", service.as_str().unwrap_or("?"))),
                );
            }
        }

        Ok(attrs)
    }
}
