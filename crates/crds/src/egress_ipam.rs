//! EgressIPAM CRD
//!
//! Declares how one or more CIDRs are partitioned across cluster nodes.
//! Entries are evaluated in declared order; the first CIDR containing a
//! node's address wins.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "redhatcop.redhat.io",
    version = "v1alpha1",
    kind = "EgressIPAM",
    shortname = "eipam",
    status = "EgressIPAMStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EgressIPAMSpec {
    /// Ordered CIDR assignments (first match wins, order matters)
    #[serde(default)]
    pub cidr_assignments: Vec<CIDRAssignment>,
}

/// A CIDR handed out to the nodes whose address falls inside it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CIDRAssignment {
    /// Address block (e.g., "10.1.0.0/24")
    pub cidr: String,

    /// Topology label value this assignment corresponds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_value: Option<String>,

    /// Addresses inside `cidr` that must never be allocated
    #[serde(default, rename = "reservedIPs", skip_serializing_if = "Vec::is_empty")]
    pub reserved_ips: Vec<String>,

    /// Egress IPs each selected node receives (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ips_per_node: Option<u32>,

    /// Labels a HostSubnet must carry for this assignment to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
}

impl CIDRAssignment {
    /// Number of egress IPs each matched node should hold.
    #[must_use]
    pub fn ips_per_node(&self) -> usize {
        self.ips_per_node.map_or(1, |n| n as usize)
    }

    /// Whether `labels` satisfy this assignment's node selector.
    ///
    /// An assignment without a selector accepts every record.
    #[must_use]
    pub fn selects_labels(&self, labels: &BTreeMap<String, String>) -> bool {
        self.node_selector.as_ref().is_none_or(|selector| {
            selector
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EgressIPAMStatus {
    /// Outcome of the last reconcile pass
    pub state: PolicyState,

    /// Number of nodes currently in scope
    #[serde(default)]
    pub selected_nodes: u32,

    /// Aggregated failure message of the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Last time the observed state changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,
}

/// Policy reconciliation state
///
/// Serializes as PascalCase ("Ready", "Degraded", etc.).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum PolicyState {
    /// Not reconciled yet
    #[default]
    Pending,

    /// Every in-scope record converged
    Ready,

    /// The last pass reported at least one failure
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(selector: Option<&[(&str, &str)]>) -> CIDRAssignment {
        CIDRAssignment {
            cidr: "10.1.0.0/24".to_string(),
            node_selector: selector.map(|pairs| {
                pairs
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_selects_labels_without_selector() {
        assert!(assignment(None).selects_labels(&BTreeMap::new()));
    }

    #[test]
    fn test_selects_labels_requires_every_pair() {
        let a = assignment(Some(&[("zone", "a"), ("egress", "true")]));
        let mut labels = BTreeMap::new();
        labels.insert("zone".to_string(), "a".to_string());
        assert!(!a.selects_labels(&labels));

        labels.insert("egress".to_string(), "true".to_string());
        assert!(a.selects_labels(&labels));
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: EgressIPAMSpec = serde_json::from_value(serde_json::json!({
            "cidrAssignments": [
                { "cidr": "10.1.0.0/24", "labelValue": "zone-a", "reservedIPs": ["10.1.0.1"], "ipsPerNode": 2 }
            ]
        }))
        .unwrap();

        let entry = &spec.cidr_assignments[0];
        assert_eq!(entry.cidr, "10.1.0.0/24");
        assert_eq!(entry.label_value.as_deref(), Some("zone-a"));
        assert_eq!(entry.reserved_ips, vec!["10.1.0.1".to_string()]);
        assert_eq!(entry.ips_per_node(), 2);
    }

    #[test]
    fn test_ips_per_node_defaults_to_one() {
        assert_eq!(assignment(None).ips_per_node(), 1);
    }
}
