//! Per-pass working set.

use std::collections::BTreeMap;

use crds::{EgressIPAM, HostSubnet};
use kube::ResourceExt;

use crate::error::ReconcileErrors;

/// State threaded through one reconcile pass of one policy.
///
/// Built from a single listing of HostSubnets and dropped when the pass ends.
#[derive(Debug)]
pub struct ReconcileContext {
    /// Snapshot of the policy taken at the start of the pass
    pub policy: EgressIPAM,
    /// Every HostSubnet by node name
    pub all_host_subnets: BTreeMap<String, HostSubnet>,
    /// HostSubnets in scope, refreshed with the stored object after each write
    pub selected_host_subnets: BTreeMap<String, HostSubnet>,
    /// CIDR to the sorted names of the nodes that matched it
    pub selected_nodes_by_cidr: BTreeMap<String, Vec<String>>,
    /// Node name to its planned egress IPs
    pub final_ips_by_node: BTreeMap<String, Vec<String>>,
    /// Successful record writes so far
    pub writes: usize,
    /// Everything that went wrong so far
    pub errors: ReconcileErrors,
}

impl ReconcileContext {
    /// Start a pass over `records`.
    #[must_use]
    pub fn new(policy: EgressIPAM, records: Vec<HostSubnet>) -> Self {
        let all_host_subnets = records
            .into_iter()
            .map(|record| (record.name_any(), record))
            .collect();

        Self {
            policy,
            all_host_subnets,
            selected_host_subnets: BTreeMap::new(),
            selected_nodes_by_cidr: BTreeMap::new(),
            final_ips_by_node: BTreeMap::new(),
            writes: 0,
            errors: ReconcileErrors::new(),
        }
    }

    /// Policy name
    #[must_use]
    pub fn policy_name(&self) -> String {
        self.policy.name_any()
    }

    /// Records outside the selected set, in name order.
    pub fn unselected_host_subnets(&self) -> impl Iterator<Item = &HostSubnet> {
        self.all_host_subnets
            .iter()
            .filter(|(name, _)| !self.selected_host_subnets.contains_key(*name))
            .map(|(_, record)| record)
    }
}
