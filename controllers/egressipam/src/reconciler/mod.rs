//! Reconciliation logic for EgressIPAM policies.
//!
//! One pass over a policy:
//! - `matcher`: compile the policy's CIDR assignments
//! - `selector`: split HostSubnets into in-scope and out-of-scope
//! - `planner`: decide CIDR membership and egress IPs per node
//! - `applier`: write `egressCIDRs`, then `egressIPs`, to in-scope records
//! - `cleaner`: clear both fields on out-of-scope records
//!
//! `namespace` handles the separate namespace association cleanup.

pub mod applier;
pub mod cleaner;
pub mod context;
pub mod matcher;
pub mod namespace;
pub mod planner;
pub mod selector;

#[cfg(test)]
mod namespace_test;

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::{ControllerError, ReconcileErrors};
use context::ReconcileContext;
use crds::{EgressIPAM, EgressIPAMStatus, PolicyState};
use cluster_client::ClusterClientTrait;
use kube::ResourceExt;
use matcher::CidrMatcher;
use planner::{plan_allocation, reserved_addresses};
use selector::select_host_subnets;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Backoff state for a policy
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles EgressIPAM policies against HostSubnets, and namespaces against NetNamespaces.
pub struct Reconciler {
    pub(crate) client: Arc<dyn ClusterClientTrait>,
    /// Bounds in-flight record writes within a sweep
    pub(crate) write_permits: Option<Arc<Semaphore>>,
    backoff_min_minutes: u64,
    backoff_max_minutes: u64,
    /// Error count tracking per policy (name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("write_permits", &self.write_permits)
            .field("backoff_min_minutes", &self.backoff_min_minutes)
            .field("backoff_max_minutes", &self.backoff_max_minutes)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: impl ClusterClientTrait + 'static, config: &ControllerConfig) -> Self {
        Self {
            client: Arc::new(client),
            write_permits: config
                .max_concurrent_writes
                .map(|limit| Arc::new(Semaphore::new(limit))),
            backoff_min_minutes: config.backoff_min_minutes,
            backoff_max_minutes: config.backoff_max_minutes,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run one convergence pass for the named policy.
    ///
    /// A deleted policy is a successful no-op. Failing to list HostSubnets
    /// aborts the pass before any write. Every other failure is collected and
    /// returned as one [`ControllerError::Reconcile`] after all writes ran.
    pub async fn reconcile_egress_ipam(&self, name: &str) -> Result<(), ControllerError> {
        let policy = match self.client.get_egress_ipam(name).await {
            Ok(policy) => policy,
            Err(e) if e.is_not_found() => {
                info!("EgressIPAM {} not found, nothing to reconcile", name);
                return Ok(());
            }
            Err(e) => {
                error!("Failed to get EgressIPAM {}: {}", name, e);
                return Err(e.into());
            }
        };

        let records = self.client.list_host_subnets().await.map_err(|e| {
            error!("Failed to list HostSubnets for EgressIPAM {}: {}", name, e);
            ControllerError::Cluster(e)
        })?;

        let mut rc = ReconcileContext::new(policy, records);
        Self::plan(&mut rc);

        self.assign_cidrs_to_host_subnets(&mut rc).await;
        self.reconcile_host_subnet_egress_ips(&mut rc).await;
        self.remove_egress_from_unselected_host_subnets(&mut rc).await;

        let errors = std::mem::take(&mut rc.errors);
        self.update_status(&rc.policy, rc.selected_host_subnets.len(), &errors)
            .await;

        if errors.is_empty() {
            info!(
                "EgressIPAM {} converged: {} node(s) selected, {} write(s)",
                name,
                rc.selected_host_subnets.len(),
                rc.writes
            );
            return Ok(());
        }

        let configuration = errors.iter().filter(|e| e.is_configuration()).count();
        warn!(
            "EgressIPAM {} pass finished with {} configuration issue(s) and {} failed write(s) after {} write(s)",
            name,
            configuration,
            errors.len() - configuration,
            rc.writes
        );
        Err(errors.into())
    }

    /// Fill the selection and plan of `rc`; no I/O.
    fn plan(rc: &mut ReconcileContext) {
        let (matcher, issues) = CidrMatcher::compile(&rc.policy);
        for issue in issues {
            warn!("EgressIPAM {}: {}", rc.policy_name(), issue);
            rc.errors.push(issue);
        }

        let selection = select_host_subnets(&matcher, &rc.all_host_subnets);
        let (reserved, issues) = reserved_addresses(&matcher, &rc.all_host_subnets, &selection.selected);
        rc.errors.extend(issues);

        let (plan, issues) = plan_allocation(&matcher, &selection, &reserved);
        debug!(
            "EgressIPAM {} plan: {:?} nodes by CIDR, {:?} IPs by node",
            rc.policy_name(),
            plan.nodes_by_cidr,
            plan.ips_by_node
        );

        rc.errors.extend(selection.issues);
        rc.errors.extend(issues);
        rc.selected_host_subnets = selection.selected;
        rc.selected_nodes_by_cidr = plan.nodes_by_cidr;
        rc.final_ips_by_node = plan.ips_by_node;
    }

    /// Patch the policy status when state, node count or error changed.
    ///
    /// `lastReconciled` only moves together with a real change so that the
    /// patch does not retrigger the policy watch forever.
    async fn update_status(&self, policy: &EgressIPAM, selected: usize, errors: &ReconcileErrors) {
        let name = policy.name_any();
        let state = if errors.is_empty() {
            PolicyState::Ready
        } else {
            PolicyState::Degraded
        };
        let error = (!errors.is_empty()).then(|| errors.to_string());
        let selected_nodes = u32::try_from(selected).unwrap_or(u32::MAX);

        if let Some(current) = &policy.status
            && current.state == state
            && current.selected_nodes == selected_nodes
            && current.error == error
        {
            debug!("EgressIPAM {} status unchanged ({:?})", name, state);
            return;
        }

        let status = EgressIPAMStatus {
            state,
            selected_nodes,
            error,
            last_reconciled: Some(chrono::Utc::now()),
        };
        if let Err(e) = self.client.patch_egress_ipam_status(&name, &status).await {
            warn!("Failed to update EgressIPAM {} status: {}", name, e);
        }
    }

    /// Get the Fibonacci backoff duration for a policy based on its error count
    ///
    /// Returns (backoff, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(|| BackoffState::new(self.backoff_min_minutes, self.backoff_max_minutes));
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(self.backoff_min_minutes * 60), 0)
            }
        }
    }

    /// Increment error count for a policy
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(|| BackoffState::new(self.backoff_min_minutes, self.backoff_max_minutes))
                .increment_error();
        }
    }

    /// Reset error count for a policy (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock()
            && let Some(state) = states.get_mut(resource_key)
        {
            state.reset();
        }
    }
}
