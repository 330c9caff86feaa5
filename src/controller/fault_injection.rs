//! FaultInjection controller implementation
//!
//! The reconciler is a small two-pass state machine. The first pass over a
//! new intent only advances the phase from Pending to Created; the status
//! write re-enters the watch, and the following pass performs the filter
//! existence check and creates the EnvoyFilter if it is missing. The phase
//! transition table is explicit and pure so the two-pass behavior can be
//! tested without any cluster I/O.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{EnvoyFilter, FaultInjection, FaultInjectionStatus, Phase};
use crate::error::Error;
use crate::fault;

/// Trait abstracting the cluster operations the reconciler needs
///
/// The surface is deliberately narrow: read the two resource kinds, create
/// the filter, replace the intent status. This keeps the reconciler testable
/// against mocks and keeps the controller from holding broader cluster
/// access than it uses.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a FaultInjection by namespace and name
    ///
    /// Returns `None` when the intent does not exist.
    async fn get_fault_injection(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FaultInjection>, Error>;

    /// Fetch an EnvoyFilter by namespace and name
    ///
    /// Returns `None` when the filter does not exist.
    async fn get_envoy_filter(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EnvoyFilter>, Error>;

    /// Create an EnvoyFilter
    ///
    /// A create that loses a race to another writer reports
    /// [`CreateOutcome::AlreadyExists`] instead of an error.
    async fn create_envoy_filter(&self, filter: EnvoyFilter) -> Result<CreateOutcome, Error>;

    /// Replace the status subresource of a FaultInjection
    ///
    /// The write carries the intent's `resourceVersion`; a concurrent
    /// modification fails the request with a conflict, which propagates so
    /// the scheduler re-fetches and retries.
    async fn replace_status(&self, intent: &FaultInjection) -> Result<(), Error>;
}

/// Outcome of an EnvoyFilter create call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The filter was created by this call
    Created,
    /// The filter already existed; another writer won the race
    AlreadyExists,
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_fault_injection(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FaultInjection>, Error> {
        let api: Api<FaultInjection> = Api::namespaced(self.client.clone(), namespace);

        match api.get(name).await {
            Ok(intent) => Ok(Some(intent)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_envoy_filter(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<EnvoyFilter>, Error> {
        let api: Api<EnvoyFilter> = Api::namespaced(self.client.clone(), namespace);

        match api.get(name).await {
            Ok(filter) => Ok(Some(filter)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_envoy_filter(&self, filter: EnvoyFilter) -> Result<CreateOutcome, Error> {
        let namespace = filter.namespace().unwrap_or_default();
        let api: Api<EnvoyFilter> = Api::namespaced(self.client.clone(), &namespace);

        match api.create(&PostParams::default(), &filter).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_status(&self, intent: &FaultInjection) -> Result<(), Error> {
        let namespace = intent.namespace().unwrap_or_default();
        let name = intent.name_any();
        let api: Api<FaultInjection> = Api::namespaced(self.client.clone(), &namespace);

        let data =
            serde_json::to_vec(intent).map_err(|e| Error::serialization(e.to_string()))?;
        api.replace_status(&name, &PostParams::default(), data)
            .await?;

        Ok(())
    }
}

/// Controller context shared across reconciliation calls
pub struct Context {
    /// Cluster access facade (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
}

impl Context {
    /// Create a context over an existing facade
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }

    /// Create a context backed by the real Kubernetes client
    pub fn from_client(client: Client) -> Self {
        Self::new(Arc::new(KubeClientImpl::new(client)))
    }
}

/// What the reconciler does for an intent in a given phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseAction {
    /// Advance the phase only; the filter is handled on a later pass
    None,
    /// Look up the EnvoyFilter and create it if missing
    EnsureFilter,
}

/// One row of the phase transition table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Action performed during this pass
    pub action: PhaseAction,
    /// Phase persisted at the end of this pass
    pub next: Phase,
}

/// Phase transition table
///
/// Pending advances to Created without touching the filter; the status write
/// triggers the next pass. Created stays Created and ensures the filter
/// exists. The table never moves a phase backward.
pub const fn transition(phase: Phase) -> Transition {
    match phase {
        Phase::Pending => Transition {
            action: PhaseAction::None,
            next: Phase::Created,
        },
        Phase::Created => Transition {
            action: PhaseAction::EnsureFilter,
            next: Phase::Created,
        },
    }
}

/// Owner reference linking the filter to its intent
///
/// Garbage collection cascades filter deletion when the intent is removed.
fn owner_reference(intent: &FaultInjection) -> OwnerReference {
    OwnerReference {
        api_version: FaultInjection::api_version(&()).to_string(),
        kind: FaultInjection::kind(&()).to_string(),
        name: intent.name_any(),
        uid: intent.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Reconcile a FaultInjection intent
///
/// Invoked by the controller runtime whenever the intent or an EnvoyFilter
/// it owns changes. At-least-once delivery; every step is idempotent.
pub async fn reconcile(intent: Arc<FaultInjection>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = intent.namespace().unwrap_or_default();
    let name = intent.name_any();
    info!(name = %name, namespace = %namespace, "reconciling fault injection");

    // Re-fetch by key; the watch event may be stale
    let Some(mut intent) = ctx.kube.get_fault_injection(&namespace, &name).await? else {
        // Intent deleted; the owner reference cascades filter cleanup
        debug!(name = %name, namespace = %namespace, "fault injection gone, nothing to do");
        return Ok(Action::await_change());
    };

    if let Err(e) = intent.spec.validate() {
        // No Failed phase exists; invalid intents park until the spec changes
        warn!(name = %name, namespace = %namespace, error = %e, "invalid fault injection spec");
        return Ok(Action::await_change());
    }

    let phase = intent.status.as_ref().map(|s| s.phase).unwrap_or_default();
    let plan = transition(phase);
    debug!(?phase, next = ?plan.next, "planned phase transition");

    match plan.action {
        PhaseAction::None => {}
        PhaseAction::EnsureFilter => {
            let target = fault::target_for(&intent);

            match ctx
                .kube
                .get_envoy_filter(&target.namespace, &target.name)
                .await?
            {
                Some(_) => {
                    // Present; the ownership watch re-triggers on filter changes
                    debug!(filter = %target.name, namespace = %target.namespace, "envoy filter already present");
                }
                None => {
                    let mut filter = fault::desired_envoy_filter(&target, &intent.spec.selector);
                    filter.metadata.owner_references = Some(vec![owner_reference(&intent)]);

                    match ctx.kube.create_envoy_filter(filter).await? {
                        CreateOutcome::Created => {
                            info!(filter = %target.name, namespace = %target.namespace, "created envoy filter");
                        }
                        CreateOutcome::AlreadyExists => {
                            debug!(filter = %target.name, namespace = %target.namespace, "envoy filter created concurrently");
                        }
                    }
                }
            }
        }
    }

    // The status is written on every pass; for a Pending intent this write
    // re-enters the watch and drives the pass that checks the filter
    intent.status = Some(FaultInjectionStatus::with_phase(plan.next));
    ctx.kube.replace_status(&intent).await?;

    Ok(Action::await_change())
}

/// Error policy for the controller
///
/// Called when reconciliation fails; requeues the intent after a delay so
/// transient API errors (conflicts, timeouts) converge on retry.
pub fn error_policy(intent: Arc<FaultInjection>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        fault_injection = %intent.name_any(),
        "reconciliation failed"
    );

    Action::requeue(Duration::from_secs(5))
}
