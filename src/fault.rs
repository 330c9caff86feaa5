//! Desired-state construction for the HTTP fault filter
//!
//! Pure functions that turn a FaultInjection intent into the EnvoyFilter the
//! controller creates. Construction does no I/O and is deterministic: the
//! same target and selector always produce a structurally identical filter.
//!
//! The emitted filter inserts Envoy's HTTP fault filter before the matched
//! position in the inbound sidecar HTTP filter chain, configured for
//! header-driven aborts at a 100% trigger percentage. Delay and response
//! rate-limit faults are intentionally not emitted (see DESIGN.md).

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;

use crate::crd::{
    ApplyTo, EnvoyConfigObjectMatch, EnvoyConfigObjectPatch, EnvoyFilter, EnvoyFilterSpec,
    FaultInjection, FilterChainMatch, FilterMatch, ListenerMatch, Patch, PatchContext,
    PatchOperation, WorkloadSelector,
};

/// Canonical name of the Envoy HTTP connection manager network filter
pub const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";

/// Canonical name of the Envoy HTTP fault filter
pub const FAULT_FILTER_NAME: &str = "envoy.fault";

/// Type URL of the HTTP fault filter configuration
pub const FAULT_FILTER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.fault.v3.HTTPFault";

/// Identity of the EnvoyFilter derived from a FaultInjection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterTarget {
    /// Name of the derived filter
    pub name: String,
    /// Namespace the filter lives in
    pub namespace: String,
}

/// Derive the child filter identity from the parent intent
///
/// Lookup and construction must both go through this function so the key the
/// controller checks and the object it builds can never diverge.
pub fn target_for(intent: &FaultInjection) -> FilterTarget {
    FilterTarget {
        name: intent.spec.name.clone(),
        namespace: intent.spec.namespace.clone(),
    }
}

/// Build the desired EnvoyFilter for a target and workload selector
pub fn desired_envoy_filter(
    target: &FilterTarget,
    selector: &BTreeMap<String, String>,
) -> EnvoyFilter {
    EnvoyFilter {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            ..Default::default()
        },
        spec: EnvoyFilterSpec {
            workload_selector: Some(WorkloadSelector {
                labels: selector.clone(),
            }),
            config_patches: vec![EnvoyConfigObjectPatch {
                apply_to: ApplyTo::HttpFilter,
                match_: Some(EnvoyConfigObjectMatch {
                    context: PatchContext::SidecarInbound,
                    listener: Some(ListenerMatch {
                        filter_chain: Some(FilterChainMatch {
                            filter: Some(FilterMatch {
                                name: HTTP_CONNECTION_MANAGER.to_string(),
                            }),
                        }),
                    }),
                }),
                patch: Some(Patch {
                    operation: PatchOperation::InsertBefore,
                    value: fault_filter_value(),
                }),
            }],
        },
    }
}

/// The fault filter fragment inserted into the HTTP filter chain
///
/// `header_abort` delegates the abort decision to request headers; the 100%
/// percentage makes every header-carrying request eligible.
fn fault_filter_value() -> serde_json::Value {
    json!({
        "name": FAULT_FILTER_NAME,
        "typed_config": {
            "@type": FAULT_FILTER_TYPE_URL,
            "abort": {
                "header_abort": {},
                "percentage": { "numerator": 100 }
            }
        }
    })
}
