//! Custom Resource Definitions for Faultline
//!
//! This module contains the FaultInjection intent resource owned by this
//! operator and the subset of the Istio EnvoyFilter schema it produces.

mod envoy_filter;
mod fault_injection;

pub use envoy_filter::{
    ApplyTo, EnvoyConfigObjectMatch, EnvoyConfigObjectPatch, EnvoyFilter, EnvoyFilterSpec,
    FilterChainMatch, FilterMatch, ListenerMatch, Patch, PatchContext, PatchOperation,
    WorkloadSelector,
};
pub use fault_injection::{FaultInjection, FaultInjectionSpec, FaultInjectionStatus, Phase};
