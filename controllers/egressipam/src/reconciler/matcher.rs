//! CIDR matching for EgressIPAM policies.
//!
//! A policy's `cidrAssignments` are parsed once per pass. Entries are tried in
//! declared order and the first one whose network contains the node address
//! (and whose node selector accepts the record) wins.

use std::net::IpAddr;

use crds::{CIDRAssignment, EgressIPAM, HostSubnet};
use ipnet::IpNet;

use crate::error::ReconcileError;

/// A policy entry whose CIDR parsed.
#[derive(Debug, Clone)]
pub struct CompiledAssignment {
    /// CIDR text as declared in the policy; used as the written `egressCIDRs` value
    pub cidr: String,
    /// Parsed network with host bits cleared
    pub network: IpNet,
    /// Source entry
    pub assignment: CIDRAssignment,
}

/// Outcome of matching one HostSubnet.
#[derive(Debug, Clone)]
pub struct CidrMatch {
    /// Index into the compiled entries
    pub index: usize,
    /// The winning CIDR
    pub cidr: String,
    /// Every other CIDR that also contained the address, in declared order
    pub also_matching: Vec<String>,
}

/// Compiled, ordered view of a policy's CIDR assignments.
#[derive(Debug, Clone, Default)]
pub struct CidrMatcher {
    entries: Vec<CompiledAssignment>,
}

impl CidrMatcher {
    /// Parse every entry of `policy`.
    ///
    /// Malformed entries are left out and reported; the rest stay usable.
    #[must_use]
    pub fn compile(policy: &EgressIPAM) -> (Self, Vec<ReconcileError>) {
        let mut entries = Vec::with_capacity(policy.spec.cidr_assignments.len());
        let mut issues = Vec::new();

        for assignment in &policy.spec.cidr_assignments {
            match assignment.cidr.trim().parse::<IpNet>() {
                Ok(network) => entries.push(CompiledAssignment {
                    cidr: assignment.cidr.clone(),
                    network: network.trunc(),
                    assignment: assignment.clone(),
                }),
                Err(e) => issues.push(ReconcileError::InvalidCidr {
                    cidr: assignment.cidr.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        (Self { entries }, issues)
    }

    /// Compiled entries in declared order
    #[must_use]
    pub fn entries(&self) -> &[CompiledAssignment] {
        &self.entries
    }

    /// Entry by index, as returned in [`CidrMatch::index`]
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&CompiledAssignment> {
        self.entries.get(index)
    }

    /// Match a HostSubnet against the compiled entries.
    ///
    /// Returns `Ok(None)` when no entry applies, and `Err` when the record's
    /// `hostIP` does not parse (fails closed).
    pub fn match_host_subnet(&self, record: &HostSubnet) -> Result<Option<CidrMatch>, ReconcileError> {
        let address: IpAddr = record.host_ip.trim().parse().map_err(|_| ReconcileError::InvalidNodeAddress {
            node: record.node_name().to_string(),
            address: record.host_ip.clone(),
        })?;
        let labels = record.labels();

        let mut matching = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.network.contains(&address) && entry.assignment.selects_labels(&labels));

        let Some((index, first)) = matching.next() else {
            return Ok(None);
        };

        Ok(Some(CidrMatch {
            index,
            cidr: first.cidr.clone(),
            also_matching: matching.map(|(_, entry)| entry.cidr.clone()).collect(),
        }))
    }
}

/// CIDR of `policy` that `record` falls under, ignoring policy issues.
///
/// Used to map HostSubnet events to the policies they affect.
#[must_use]
pub fn matches_host_subnet(policy: &EgressIPAM, record: &HostSubnet) -> Option<String> {
    let (matcher, _) = CidrMatcher::compile(policy);
    matcher
        .match_host_subnet(record)
        .ok()
        .flatten()
        .map(|m| m.cidr)
}
