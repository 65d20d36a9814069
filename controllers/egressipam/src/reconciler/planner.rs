//! Egress IP allocation.
//!
//! Each selected node gets `ipsPerNode` addresses out of the CIDR it matched.
//! Nodes keep valid addresses they already hold; the remainder is filled from
//! the lowest free host addresses, walking nodes in name order. The same
//! inputs therefore always produce the same plan.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crds::HostSubnet;
use ipnet::IpNet;
use tracing::{debug, warn};

use super::matcher::CidrMatcher;
use super::selector::Selection;
use crate::error::ReconcileError;

/// Desired CIDR membership and egress IPs for every selected node.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AllocationPlan {
    /// CIDR to the names of the nodes it was assigned to, sorted
    pub nodes_by_cidr: BTreeMap<String, Vec<String>>,
    /// Node name to its planned egress IPs, sorted; every selected node has an entry
    pub ips_by_node: BTreeMap<String, Vec<String>>,
}

fn parse_addresses(values: &[String]) -> Vec<IpAddr> {
    let mut parsed: Vec<IpAddr> = values.iter().filter_map(|v| v.trim().parse().ok()).collect();
    parsed.sort_unstable();
    parsed.dedup();
    parsed
}

/// Whether `ip` is a usable host address of `network`.
///
/// Mirrors `IpNet::hosts()`: IPv4 networks shorter than /31 lose their
/// network and broadcast addresses, everything else is usable.
fn is_host(network: &IpNet, ip: &IpAddr) -> bool {
    if !network.contains(ip) {
        return false;
    }
    match network {
        IpNet::V4(net) if net.prefix_len() < 31 => {
            *ip != IpAddr::V4(net.network()) && *ip != IpAddr::V4(net.broadcast())
        }
        _ => true,
    }
}

/// Addresses no node may be given in this pass.
///
/// The union of every policy `reservedIPs` entry, every node's `hostIP`, and
/// the egress IPs still held by records outside `selected`. The latter are
/// cleared only after the selected records are written.
#[must_use]
pub fn reserved_addresses(
    matcher: &CidrMatcher,
    all: &BTreeMap<String, HostSubnet>,
    selected: &BTreeMap<String, HostSubnet>,
) -> (BTreeSet<IpAddr>, Vec<ReconcileError>) {
    let mut reserved = BTreeSet::new();
    let mut issues = Vec::new();

    for entry in matcher.entries() {
        for ip in &entry.assignment.reserved_ips {
            match ip.trim().parse::<IpAddr>() {
                Ok(address) => {
                    reserved.insert(address);
                }
                Err(_) => {
                    let issue = ReconcileError::InvalidReservedIp {
                        cidr: entry.cidr.clone(),
                        ip: ip.clone(),
                    };
                    warn!("{}", issue);
                    issues.push(issue);
                }
            }
        }
    }

    for (name, record) in all {
        if let Ok(address) = record.host_ip.trim().parse::<IpAddr>() {
            reserved.insert(address);
        }
        if !selected.contains_key(name) {
            reserved.extend(parse_addresses(&record.egress_ips));
        }
    }

    (reserved, issues)
}

/// Plan CIDR membership and egress IPs for the selected nodes.
///
/// Never returns an address outside the node's CIDR or inside `reserved`.
/// Nodes left short of `ipsPerNode` are reported as one
/// [`ReconcileError::AllocationShortfall`] per CIDR.
#[must_use]
pub fn plan_allocation(
    matcher: &CidrMatcher,
    selection: &Selection,
    reserved: &BTreeSet<IpAddr>,
) -> (AllocationPlan, Vec<ReconcileError>) {
    let nodes_by_entry = selection.nodes_by_entry();
    let mut issues = Vec::new();

    let mut claimed: BTreeSet<IpAddr> = BTreeSet::new();
    let mut allocated: BTreeMap<&str, Vec<IpAddr>> =
        selection.selected.keys().map(|node| (node.as_str(), Vec::new())).collect();

    // Sticky pass
    for (index, nodes) in &nodes_by_entry {
        let Some(entry) = matcher.entry(*index) else { continue };
        let wanted = entry.assignment.ips_per_node();

        for node in nodes {
            let Some(record) = selection.selected.get(node) else { continue };
            let kept = allocated.entry(node.as_str()).or_default();
            for address in parse_addresses(&record.egress_ips) {
                if kept.len() >= wanted {
                    break;
                }
                if is_host(&entry.network, &address) && !reserved.contains(&address) && claimed.insert(address) {
                    kept.push(address);
                }
            }
        }
    }

    // Fill pass; addresses a holder gave up in the sticky pass are free again
    for (index, nodes) in &nodes_by_entry {
        let Some(entry) = matcher.entry(*index) else { continue };
        let wanted = entry.assignment.ips_per_node();
        let mut pool = entry.network.hosts();
        let mut short = Vec::new();

        for node in nodes {
            let kept = allocated.entry(node.as_str()).or_default();
            while kept.len() < wanted {
                let next = pool
                    .by_ref()
                    .find(|address| !reserved.contains(address) && !claimed.contains(address));
                let Some(address) = next else {
                    short.push(node.clone());
                    break;
                };
                debug!("Allocating {} from {} to {}", address, entry.cidr, node);
                claimed.insert(address);
                kept.push(address);
            }
        }

        if !short.is_empty() {
            let issue = ReconcileError::AllocationShortfall {
                cidr: entry.cidr.clone(),
                nodes: short,
            };
            warn!("{}", issue);
            issues.push(issue);
        }
    }

    let mut plan = AllocationPlan::default();
    for (index, nodes) in &nodes_by_entry {
        let Some(entry) = matcher.entry(*index) else { continue };
        let members = plan.nodes_by_cidr.entry(entry.cidr.clone()).or_default();
        members.extend(nodes.iter().cloned());
        members.sort();
        members.dedup();
    }
    for (node, mut addresses) in allocated {
        addresses.sort_unstable();
        plan.ips_by_node
            .insert(node.to_string(), addresses.iter().map(ToString::to_string).collect());
    }

    (plan, issues)
}
