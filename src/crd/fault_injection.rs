//! FaultInjection Custom Resource Definition
//!
//! A FaultInjection declares that a set of workloads should receive the HTTP
//! fault filter in their inbound sidecar filter chain. The controller derives
//! one EnvoyFilter per intent and records the lifecycle phase on the status.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a FaultInjection intent
///
/// The spec names the EnvoyFilter this intent materializes as and selects the
/// workloads whose sidecars receive the fault filter.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "faultline.dev",
    version = "v1alpha1",
    kind = "FaultInjection",
    plural = "faultinjections",
    shortname = "fi",
    status = "FaultInjectionStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Filter","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FaultInjectionSpec {
    /// Name of the EnvoyFilter this intent materializes as
    pub name: String,

    /// Namespace the EnvoyFilter is created in
    pub namespace: String,

    /// Workload selector labels for the sidecars receiving the fault filter
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

impl FaultInjectionSpec {
    /// Validate the intent specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::validation("spec.name must not be empty"));
        }
        if self.namespace.trim().is_empty() {
            return Err(crate::Error::validation("spec.namespace must not be empty"));
        }
        Ok(())
    }
}

/// Status for a FaultInjection
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultInjectionStatus {
    /// Current phase of the fault injection lifecycle
    #[serde(default)]
    pub phase: Phase,
}

impl FaultInjectionStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: Phase) -> Self {
        Self { phase }
    }
}

/// Fault injection lifecycle phase
///
/// Phases only move forward: `Pending < Created`. The controller never writes
/// a phase lower than the one it observed, and the CRD schema restricts the
/// stored value to these two variants.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum Phase {
    /// Intent observed; filter creation is deferred to a later pass
    #[default]
    Pending,
    /// Phase advanced; the EnvoyFilter is ensured on every pass
    Created,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Created => write!(f, "Created"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> FaultInjectionSpec {
        FaultInjectionSpec {
            name: "python-api-faultinjection".to_string(),
            namespace: "default".to_string(),
            selector: BTreeMap::from([("app".to_string(), "python-api".to_string())]),
        }
    }

    // =========================================================================
    // Validation Stories
    // =========================================================================

    /// Story: A complete intent passes validation
    #[test]
    fn story_complete_intent_passes_validation() {
        assert!(sample_spec().validate().is_ok());
    }

    /// Story: An intent without a target filter name is rejected
    ///
    /// The filter name is the identity of the derived EnvoyFilter; without it
    /// there is nothing to look up or create.
    #[test]
    fn story_empty_filter_name_fails_validation() {
        let mut spec = sample_spec();
        spec.name = String::new();

        let result = spec.validate();
        assert!(result.is_err(), "Empty filter name should fail");
        assert!(result.unwrap_err().to_string().contains("spec.name"));
    }

    /// Story: An intent without a target namespace is rejected
    #[test]
    fn story_empty_namespace_fails_validation() {
        let mut spec = sample_spec();
        spec.namespace = "  ".to_string();

        assert!(spec.validate().is_err(), "Blank namespace should fail");
    }

    // =========================================================================
    // Phase Ordering Stories
    // =========================================================================
    //
    // The phase is a one-way ratchet. These tests pin the ordering the
    // controller's transition table relies on.

    /// Story: A fresh intent with no status starts out Pending
    #[test]
    fn story_unset_phase_defaults_to_pending() {
        assert_eq!(Phase::default(), Phase::Pending);
        assert_eq!(FaultInjectionStatus::default().phase, Phase::Pending);
    }

    /// Story: Pending sorts strictly before Created
    #[test]
    fn story_phase_ordering_is_pending_then_created() {
        assert!(Phase::Pending < Phase::Created);
    }

    /// Story: Phases render as their wire values for logs and print columns
    #[test]
    fn story_phase_display_matches_wire_format() {
        assert_eq!(Phase::Pending.to_string(), "Pending");
        assert_eq!(Phase::Created.to_string(), "Created");
        assert_eq!(
            serde_json::to_value(Phase::Created).unwrap(),
            serde_json::json!("Created")
        );
    }

    // =========================================================================
    // YAML Serialization Stories
    // =========================================================================

    /// Story: User declares a fault injection in a YAML manifest
    #[test]
    fn story_yaml_manifest_defines_fault_injection() {
        let yaml = r#"
name: python-api-faultinjection
namespace: default
selector:
  app: python-api
"#;
        let spec: FaultInjectionSpec = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(spec.name, "python-api-faultinjection");
        assert_eq!(spec.namespace, "default");
        assert_eq!(spec.selector.get("app").map(String::as_str), Some("python-api"));
    }

    /// Story: A manifest without a selector still parses
    ///
    /// The selector defaults to empty; the derived filter then carries an
    /// empty workload selector and Istio scopes it to the whole namespace.
    #[test]
    fn story_manifest_without_selector_parses() {
        let yaml = r#"
name: checkout-faults
namespace: shop
"#;
        let spec: FaultInjectionSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.selector.is_empty());
    }

    /// Story: Spec survives serialization roundtrip
    #[test]
    fn story_spec_survives_yaml_roundtrip() {
        let spec = sample_spec();
        let yaml = serde_yaml::to_string(&spec).unwrap();
        let parsed: FaultInjectionSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(spec, parsed, "Spec should survive roundtrip");
    }

    /// Story: Status phase is stored under the camelCase key the CRD declares
    #[test]
    fn story_status_serializes_phase_field() {
        let status = FaultInjectionStatus::with_phase(Phase::Created);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value, serde_json::json!({ "phase": "Created" }));
    }
}
