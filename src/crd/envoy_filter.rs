//! Istio EnvoyFilter resource types
//!
//! Typed subset of the `networking.istio.io/v1alpha3` EnvoyFilter schema
//! covering what this operator produces: a workload selector plus config
//! patches that insert filters into the sidecar filter chain. The patch value
//! is a free-form JSON document, mirroring the protobuf `Struct` Istio uses.
//!
//! The CRD itself is owned and installed by Istio; these types only let the
//! controller read and create instances with a typed client.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// EnvoyFilter spec: which workloads to patch and how
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "EnvoyFilter",
    plural = "envoyfilters",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyFilterSpec {
    /// Workloads the filter applies to; absent selects every workload in scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,

    /// Ordered patches applied to the generated proxy configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_patches: Vec<EnvoyConfigObjectPatch>,
}

/// Label-based workload selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSelector {
    /// Labels a workload must carry to receive the patches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A single patch against one location in the proxy configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyConfigObjectPatch {
    /// Where in the proxy configuration the patch applies
    pub apply_to: ApplyTo,

    /// Conditions narrowing which generated objects are patched
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "match")]
    pub match_: Option<EnvoyConfigObjectMatch>,

    /// The operation and value to apply at the matched location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}

/// Location in the generated proxy configuration a patch targets
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplyTo {
    /// A listener
    Listener,
    /// A filter chain within a listener
    FilterChain,
    /// A network filter within a filter chain
    NetworkFilter,
    /// An HTTP filter within the HTTP connection manager
    HttpFilter,
    /// A route configuration
    RouteConfiguration,
    /// A route within a virtual host
    HttpRoute,
    /// A cluster
    Cluster,
}

/// Match conditions selecting which generated objects are patched
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyConfigObjectMatch {
    /// Traffic direction context the patch applies in
    #[serde(default)]
    pub context: PatchContext,

    /// Listener-level match conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<ListenerMatch>,
}

/// Traffic direction context for a patch
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchContext {
    /// All traffic contexts
    #[default]
    Any,
    /// Inbound traffic at a sidecar
    SidecarInbound,
    /// Outbound traffic at a sidecar
    SidecarOutbound,
    /// Gateway traffic
    Gateway,
}

/// Listener match conditions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListenerMatch {
    /// Filter chain match within the listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_chain: Option<FilterChainMatch>,
}

/// Filter chain match conditions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterChainMatch {
    /// Network filter match within the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterMatch>,
}

/// Network filter match by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterMatch {
    /// Canonical filter name, e.g. the HTTP connection manager
    pub name: String,
}

/// Patch operation and value
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// How the value is combined with the matched configuration
    pub operation: PatchOperation,

    /// The configuration fragment to apply
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub value: serde_json::Value,
}

/// How a patch value is combined with the matched configuration
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchOperation {
    /// Merge the value into the matched object
    Merge,
    /// Add the value to a list
    Add,
    /// Remove the matched object
    Remove,
    /// Insert the value before the matched list position
    InsertBefore,
    /// Insert the value after the matched list position
    InsertAfter,
    /// Insert the value at the head of the list
    InsertFirst,
    /// Replace the matched object with the value
    Replace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================================================
    // Wire Format Stories
    // =========================================================================
    //
    // EnvoyFilter instances are consumed by Istio, so the serialized form must
    // match the upstream schema exactly: camelCase keys, SCREAMING_SNAKE_CASE
    // enum values, "match" as the match key.

    /// Story: An Istio-authored manifest parses into the typed spec
    #[test]
    fn story_istio_manifest_parses_into_typed_spec() {
        let yaml = r#"
workloadSelector:
  labels:
    app: python-api
configPatches:
- applyTo: HTTP_FILTER
  match:
    context: SIDECAR_INBOUND
    listener:
      filterChain:
        filter:
          name: "envoy.filters.network.http_connection_manager"
  patch:
    operation: INSERT_BEFORE
    value:
      name: envoy.fault
"#;
        let spec: EnvoyFilterSpec = serde_yaml::from_str(yaml).unwrap();

        let selector = spec.workload_selector.expect("selector should parse");
        assert_eq!(selector.labels.get("app").map(String::as_str), Some("python-api"));

        assert_eq!(spec.config_patches.len(), 1);
        let patch = &spec.config_patches[0];
        assert_eq!(patch.apply_to, ApplyTo::HttpFilter);

        let match_ = patch.match_.as_ref().expect("match should parse");
        assert_eq!(match_.context, PatchContext::SidecarInbound);
        assert_eq!(
            match_
                .listener
                .as_ref()
                .and_then(|l| l.filter_chain.as_ref())
                .and_then(|fc| fc.filter.as_ref())
                .map(|f| f.name.as_str()),
            Some("envoy.filters.network.http_connection_manager")
        );

        let op = patch.patch.as_ref().expect("patch should parse");
        assert_eq!(op.operation, PatchOperation::InsertBefore);
        assert_eq!(op.value["name"], json!("envoy.fault"));
    }

    /// Story: Enum values serialize in Istio's SCREAMING_SNAKE_CASE form
    #[test]
    fn story_enums_serialize_in_istio_wire_form() {
        assert_eq!(
            serde_json::to_value(ApplyTo::HttpFilter).unwrap(),
            json!("HTTP_FILTER")
        );
        assert_eq!(
            serde_json::to_value(PatchContext::SidecarInbound).unwrap(),
            json!("SIDECAR_INBOUND")
        );
        assert_eq!(
            serde_json::to_value(PatchOperation::InsertBefore).unwrap(),
            json!("INSERT_BEFORE")
        );
    }

    /// Story: The match conditions serialize under the "match" key
    ///
    /// "match" is a Rust keyword, so the field is renamed; the wire format
    /// must still use the upstream key.
    #[test]
    fn story_match_field_keeps_upstream_key() {
        let patch = EnvoyConfigObjectPatch {
            apply_to: ApplyTo::HttpFilter,
            match_: Some(EnvoyConfigObjectMatch {
                context: PatchContext::SidecarInbound,
                listener: None,
            }),
            patch: None,
        };

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({
                "applyTo": "HTTP_FILTER",
                "match": { "context": "SIDECAR_INBOUND" }
            })
        );
    }

    /// Story: An empty spec stays empty on the wire
    ///
    /// Absent selector and patches are omitted entirely rather than written
    /// as nulls, matching what Istio's own tooling emits.
    #[test]
    fn story_empty_spec_serializes_compactly() {
        let value = serde_json::to_value(EnvoyFilterSpec::default()).unwrap();
        assert_eq!(value, json!({}));
    }

    /// Story: Spec survives a serialization roundtrip
    #[test]
    fn story_spec_survives_json_roundtrip() {
        let spec = EnvoyFilterSpec {
            workload_selector: Some(WorkloadSelector {
                labels: BTreeMap::from([("app".to_string(), "python-api".to_string())]),
            }),
            config_patches: vec![EnvoyConfigObjectPatch {
                apply_to: ApplyTo::HttpFilter,
                match_: Some(EnvoyConfigObjectMatch {
                    context: PatchContext::SidecarInbound,
                    listener: Some(ListenerMatch {
                        filter_chain: Some(FilterChainMatch {
                            filter: Some(FilterMatch {
                                name: "envoy.filters.network.http_connection_manager".to_string(),
                            }),
                        }),
                    }),
                }),
                patch: Some(Patch {
                    operation: PatchOperation::InsertBefore,
                    value: json!({ "name": "envoy.fault" }),
                }),
            }],
        };

        let encoded = serde_json::to_string(&spec).unwrap();
        let parsed: EnvoyFilterSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(spec, parsed, "Spec should survive roundtrip");
    }
}
