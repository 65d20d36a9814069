//! Scope selection: which HostSubnets a policy governs.

use std::collections::BTreeMap;

use crds::HostSubnet;
use tracing::{debug, warn};

use super::matcher::CidrMatcher;
use crate::error::ReconcileError;

/// HostSubnets in scope of a policy and the entry each one matched.
#[derive(Debug, Default)]
pub struct Selection {
    /// In-scope records by node name
    pub selected: BTreeMap<String, HostSubnet>,
    /// Node name to the index of the matching compiled entry
    pub entry_by_node: BTreeMap<String, usize>,
    /// Configuration issues found while matching
    pub issues: Vec<ReconcileError>,
}

impl Selection {
    /// Node names grouped by matching entry index; names are sorted.
    #[must_use]
    pub fn nodes_by_entry(&self) -> BTreeMap<usize, Vec<String>> {
        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (node, index) in &self.entry_by_node {
            grouped.entry(*index).or_default().push(node.clone());
        }
        grouped
    }
}

/// Split `all` into the records `matcher` selects.
///
/// A record whose address is unparsable or matches several entries is
/// reported; the latter is still selected under the first matching entry.
#[must_use]
pub fn select_host_subnets(matcher: &CidrMatcher, all: &BTreeMap<String, HostSubnet>) -> Selection {
    let mut selection = Selection::default();

    for (name, record) in all {
        match matcher.match_host_subnet(record) {
            Ok(Some(m)) => {
                debug!("HostSubnet {} ({}) selected by CIDR {}", name, record.host_ip, m.cidr);
                if !m.also_matching.is_empty() {
                    let mut matching = vec![m.cidr.clone()];
                    matching.extend(m.also_matching);
                    let issue = ReconcileError::AmbiguousMatch {
                        node: name.clone(),
                        address: record.host_ip.clone(),
                        matching,
                    };
                    warn!("{}", issue);
                    selection.issues.push(issue);
                }
                selection.selected.insert(name.clone(), record.clone());
                selection.entry_by_node.insert(name.clone(), m.index);
            }
            Ok(None) => {}
            Err(issue) => {
                warn!("{}", issue);
                selection.issues.push(issue);
            }
        }
    }

    selection
}
