//! Kubernetes resource watchers.
//!
//! EgressIPAM policies are driven by `kube_runtime::Controller`, which also
//! watches HostSubnets and maps each record event to the policies it
//! concerns. Namespaces are followed with a plain watcher stream feeding the
//! association transition tracker.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::reconciler::matcher::matches_host_subnet;
use crate::reconciler::namespace::NamespaceTransitionTracker;
use crds::{EgressIPAM, HostSubnet, NAMESPACE_ANNOTATION};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, WatchStreamExt, controller::{Action, Config as RuntimeConfig}, watcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Whether a HostSubnet event can change the outcome of `policy`.
///
/// True when the record falls under one of the policy's CIDRs, or still
/// carries one of them in `egressCIDRs` and may need clearing.
pub fn tracks_host_subnet(policy: &EgressIPAM, record: &HostSubnet) -> bool {
    matches_host_subnet(policy, record).is_some()
        || record.egress_cidrs.iter().any(|cidr| {
            policy
                .spec
                .cidr_assignments
                .iter()
                .any(|assignment| &assignment.cidr == cidr)
        })
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    egress_ipam_api: Api<EgressIPAM>,
    host_subnet_api: Api<HostSubnet>,
    namespace_api: Api<Namespace>,
    resync: Duration,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("reconciler", &self.reconciler)
            .field("resync", &self.resync)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        egress_ipam_api: Api<EgressIPAM>,
        host_subnet_api: Api<HostSubnet>,
        namespace_api: Api<Namespace>,
        resync: Duration,
    ) -> Self {
        Self {
            reconciler,
            egress_ipam_api,
            host_subnet_api,
            namespace_api,
            resync,
        }
    }

    /// Runs the EgressIPAM controller loop.
    ///
    /// A successful pass requeues after the resync period. A failed pass
    /// requeues after the policy's Fibonacci backoff.
    pub async fn watch_egress_ipams(&self) -> Result<(), ControllerError> {
        info!("Starting EgressIPAM watcher");

        let resync = self.resync;
        let reconcile = move |policy: Arc<EgressIPAM>, reconciler: Arc<Reconciler>| async move {
            let name = policy.name_any();
            debug!("Reconciling EgressIPAM {}", name);
            reconciler.reconcile_egress_ipam(&name).await?;
            reconciler.reset_error(&name);
            Ok::<_, ControllerError>(Action::requeue(resync))
        };

        let error_policy = |policy: Arc<EgressIPAM>, error: &ControllerError, reconciler: Arc<Reconciler>| {
            let name = policy.name_any();
            reconciler.increment_error(&name);
            let (backoff, error_count) = reconciler.get_backoff_for_resource(&name);
            error!(
                "Reconciliation of EgressIPAM {} failed ({} consecutive), retrying in {:?}: {}",
                name, error_count, backoff, error
            );
            Action::requeue(backoff)
        };

        let controller = Controller::new(self.egress_ipam_api.clone(), watcher::Config::default());
        let policies = controller.store();

        controller
            .watches(
                self.host_subnet_api.clone(),
                watcher::Config::default(),
                move |record: HostSubnet| {
                    policies
                        .state()
                        .into_iter()
                        .filter(|policy| tracks_host_subnet(policy, &record))
                        .map(|policy| ObjectRef::from_obj(policy.as_ref()))
                        .collect::<Vec<_>>()
                },
            )
            .with_config(RuntimeConfig::default().debounce(Duration::from_secs(1)))
            .run(reconcile, error_policy, Arc::clone(&self.reconciler))
            .for_each(|res| async move {
                match res {
                    Ok((policy, _)) => debug!("Reconciled EgressIPAM {}", policy.name),
                    Err(e) => warn!("EgressIPAM controller error: {}", e),
                }
            })
            .await;

        Err(ControllerError::Watch("EgressIPAM controller stream ended".to_string()))
    }

    /// Watches Namespaces and cleans up after association removals.
    pub async fn watch_namespaces(&self) -> Result<(), ControllerError> {
        info!("Starting Namespace watcher");

        let mut tracker = NamespaceTransitionTracker::new();
        let mut stream = Box::pin(watcher(self.namespace_api.clone(), watcher::Config::default()).default_backoff());

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("Namespace watcher stream error: {}", e);
                    continue;
                }
            };

            match event {
                watcher::Event::Apply(namespace) | watcher::Event::InitApply(namespace) => {
                    if tracker.observe(&namespace) {
                        self.clean_up_namespace(&mut tracker, &namespace.name_any()).await;
                    }
                }
                watcher::Event::Delete(namespace) => {
                    let name = namespace.name_any();
                    debug!("Namespace deleted: {}", name);
                    tracker.forget(&name);
                }
                watcher::Event::Init => {
                    debug!("Namespace watcher (re)listing");
                    tracker.begin_resync();
                }
                watcher::Event::InitDone => {
                    tracker.finish_resync();
                    info!("Namespace watcher initialization complete");
                }
            }
        }

        Err(ControllerError::Watch("Namespace watcher stream ended".to_string()))
    }

    async fn clean_up_namespace(&self, tracker: &mut NamespaceTransitionTracker, name: &str) {
        info!("Namespace {} dropped {}, cleaning up egress IPs", name, NAMESPACE_ANNOTATION);
        if let Err(e) = self.reconciler.reconcile_namespace(name).await {
            error!("Failed to clean up Namespace {}: {}", name, e);
            tracker.retry(name);
        }
    }
}
