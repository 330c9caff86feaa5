//! Controller implementation for the FaultInjection CRD
//!
//! Follows the Kubernetes controller pattern: observe the intent, plan the
//! phase transition, act on the cluster, persist the observed phase.

mod fault_injection;

pub use fault_injection::{
    error_policy, reconcile, transition, Context, CreateOutcome, KubeClient, KubeClientImpl,
    PhaseAction, Transition,
};
