// Copyright (c) 2025 - Cowboy AI, Inc.
//! Output Exporter
//!
//! Collects declared outputs from applied state into the flat name-to-value
//! map that downstream systems consume. This is the only published state
//! surface of a deployment.
//!
//! Name uniqueness is enforced structurally by the graph builder before
//! anything applies; here an output whose source never reached applied
//! state fails the collection with `OutputUnresolved`.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::apply::ApplyReport;
use crate::domain::{AttrValue, Deployment, ResourceKind};
use crate::errors::{DeploymentError, DeploymentResult};

/// Collect every declared output from an apply report
///
/// Values resolve lazily from the output's applied attributes; non-string
/// values are rendered as compact JSON.
pub fn collect(deployment: &Deployment, report: &ApplyReport) -> DeploymentResult<BTreeMap<String, String>> {
    let mut exported = BTreeMap::new();

    for output in deployment.of_kind(ResourceKind::Output) {
        // Declare-time validation guarantees a literal name
        let Some(name) = output.literal_str("name") else {
            continue;
        };

        let applied = report
            .status(&output.id)
            .is_some_and(|status| status.is_applied());
        if !applied {
            return Err(DeploymentError::OutputUnresolved {
                name: name.to_string(),
                source_id: source_of(output),
            });
        }

        let value = report
            .state
            .get(&output.id)
            .and_then(|record| record.attribute("value"))
            .map(render)
            .ok_or_else(|| DeploymentError::OutputUnresolved {
                name: name.to_string(),
                source_id: source_of(output),
            })?;

        exported.insert(name.to_string(), value);
    }

    Ok(exported)
}

/// The resource an output draws its value from: the reference target, or
/// the output itself for literal values
fn source_of(output: &crate::domain::Resource) -> crate::domain::ResourceId {
    output
        .attribute("value")
        .and_then(AttrValue::reference_target)
        .cloned()
        .unwrap_or_else(|| output.id.clone())
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
