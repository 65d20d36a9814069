//! Convergence of selected HostSubnets.
//!
//! Two sweeps: `egressCIDRs` first, then `egressIPs`. Each sweep spawns one
//! task per record that differs from the plan and drains exactly as many
//! results from a channel sized to the task count. Failures are collected,
//! never short-circuited.

use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crds::HostSubnet;
use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error};

use super::Reconciler;
use super::context::ReconcileContext;
use crate::error::{ReconcileError, WriteKind};

/// One write to run concurrently with the others of its sweep.
pub(crate) struct WriteUnit<T> {
    record: String,
    kind: WriteKind,
    work: std::pin::Pin<Box<dyn Future<Output = Result<T, ReconcileError>> + Send>>,
}

impl<T> WriteUnit<T> {
    pub(crate) fn new<F>(record: impl Into<String>, kind: WriteKind, work: F) -> Self
    where
        F: Future<Output = Result<T, ReconcileError>> + Send + 'static,
    {
        Self {
            record: record.into(),
            kind,
            work: Box::pin(work),
        }
    }
}

/// Run every unit on its own task and collect one result per unit.
///
/// Results come back in the order the units were given, whatever order the
/// tasks finish in. A unit that never reports is returned as
/// [`ReconcileError::Aborted`]. `permits` bounds how many units write at once.
pub(crate) async fn fan_out<T>(units: Vec<WriteUnit<T>>, permits: Option<Arc<Semaphore>>) -> Vec<Result<T, ReconcileError>>
where
    T: Send + 'static,
{
    let launched = units.len();
    if launched == 0 {
        return Vec::new();
    }

    let mut labels = Vec::with_capacity(launched);
    let (tx, rx) = mpsc::channel(launched);
    for (index, unit) in units.into_iter().enumerate() {
        labels.push((unit.record.clone(), unit.kind));
        let tx = tx.clone();
        let permits = permits.clone();
        tokio::spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let WriteUnit { record, kind, work } = unit;
            let outcome = AssertUnwindSafe(work).catch_unwind().await.unwrap_or_else(|_| {
                Err(ReconcileError::Aborted {
                    record,
                    kind,
                    reason: "write task panicked".to_string(),
                })
            });
            // Capacity equals the unit count, so this never waits
            let _ = tx.send((index, outcome)).await;
        });
    }
    drop(tx);

    drain(rx, labels).await
}

/// Receive one `(index, outcome)` per label and order the outcomes by index.
///
/// Labels without an outcome once every sender is gone become
/// [`ReconcileError::Aborted`].
async fn drain<T>(
    mut rx: mpsc::Receiver<(usize, Result<T, ReconcileError>)>,
    labels: Vec<(String, WriteKind)>,
) -> Vec<Result<T, ReconcileError>> {
    let mut slots: Vec<Option<Result<T, ReconcileError>>> = labels.iter().map(|_| None).collect();
    for _ in 0..labels.len() {
        let Some((index, outcome)) = rx.recv().await else { break };
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    slots
        .into_iter()
        .zip(labels)
        .map(|(slot, (record, kind))| {
            slot.unwrap_or_else(|| {
                error!("{} write for {} never reported a result", kind, record);
                Err(ReconcileError::Aborted {
                    record,
                    kind,
                    reason: "write task ended without a result".to_string(),
                })
            })
        })
        .collect()
}

/// Order-insensitive comparison of two string sets.
pub(crate) fn same_members(current: &[String], desired: &[String]) -> bool {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();
    current == desired
}

impl Reconciler {
    pub(crate) fn host_subnet_write(&self, record: HostSubnet, kind: WriteKind) -> WriteUnit<HostSubnet> {
        let client = Arc::clone(&self.client);
        let name = record.node_name().to_string();
        WriteUnit::new(name.clone(), kind, async move {
            client.update_host_subnet(&record).await.map_err(|source| {
                error!("Failed to update {} for {}: {}", kind, name, source);
                ReconcileError::Write {
                    record: name,
                    kind,
                    source,
                }
            })
        })
    }

    /// Run `units`, storing written records back into the selected set.
    async fn converge_selected(&self, rc: &mut ReconcileContext, units: Vec<WriteUnit<HostSubnet>>) {
        for outcome in fan_out(units, self.write_permits.clone()).await {
            match outcome {
                Ok(updated) => {
                    rc.writes += 1;
                    rc.selected_host_subnets
                        .insert(updated.node_name().to_string(), updated);
                }
                Err(e) => rc.errors.push(e),
            }
        }
    }

    /// Make every selected record's `egressCIDRs` exactly `{its CIDR}`.
    pub async fn assign_cidrs_to_host_subnets(&self, rc: &mut ReconcileContext) {
        let mut units = Vec::new();
        for (cidr, nodes) in &rc.selected_nodes_by_cidr {
            let desired = vec![cidr.clone()];
            for node in nodes {
                let Some(record) = rc.selected_host_subnets.get(node) else { continue };
                if same_members(&record.egress_cidrs, &desired) {
                    debug!("HostSubnet {} already has egressCIDRs {:?}", node, desired);
                    continue;
                }
                debug!("HostSubnet {} egressCIDRs {:?} -> {:?}", node, record.egress_cidrs, desired);
                let mut record = record.clone();
                record.egress_cidrs = desired.clone();
                units.push(self.host_subnet_write(record, WriteKind::EgressCidrs));
            }
        }
        self.converge_selected(rc, units).await;
    }

    /// Make every selected record's `egressIPs` equal its planned set.
    pub async fn reconcile_host_subnet_egress_ips(&self, rc: &mut ReconcileContext) {
        let mut units = Vec::new();
        for (node, record) in &rc.selected_host_subnets {
            let desired = rc.final_ips_by_node.get(node).cloned().unwrap_or_default();
            if same_members(&record.egress_ips, &desired) {
                debug!("HostSubnet {} already has egressIPs {:?}", node, desired);
                continue;
            }
            debug!("HostSubnet {} egressIPs {:?} -> {:?}", node, record.egress_ips, desired);
            let mut record = record.clone();
            record.egress_ips = desired;
            units.push(self.host_subnet_write(record, WriteKind::EgressIps));
        }
        self.converge_selected(rc, units).await;
    }
}
