//! Faultline - Kubernetes operator for sidecar fault injection
//!
//! Faultline watches `FaultInjection` intent resources and materializes each
//! one as an Istio `EnvoyFilter` that inserts the HTTP fault filter into the
//! inbound sidecar filter chain. The intent declares which workloads receive
//! the filter and what the derived filter object is named; the controller
//! keeps exactly one filter alive per intent and tracks a coarse lifecycle
//! phase (`Pending` -> `Created`) on the intent's status.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (FaultInjection, EnvoyFilter)
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`fault`] - Desired-state construction for the fault filter
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod fault;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name used for server-side apply and status writes
pub const FIELD_MANAGER: &str = "faultline-controller";
