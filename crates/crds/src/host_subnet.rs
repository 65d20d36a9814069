//! HostSubnet record
//!
//! OpenShift keeps one `HostSubnet` per node. The controller owns only
//! `egressCIDRs` and `egressIPs`; every other field is carried through
//! untouched so a replace never drops data it does not understand.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Per-node subnet record (`network.openshift.io/v1`, cluster scoped).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostSubnet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Address of the node, used for CIDR membership
    #[serde(default, rename = "hostIP")]
    pub host_ip: String,

    /// CIDRs this node may host egress IPs from
    #[serde(default, rename = "egressCIDRs")]
    pub egress_cidrs: Vec<String>,

    /// Egress IPs currently hosted by this node
    #[serde(default, rename = "egressIPs")]
    pub egress_ips: Vec<String>,

    /// Fields not managed by the controller (`host`, `subnet`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

crate::openshift_network_resource!(HostSubnet, "HostSubnet", "hostsubnets");

impl HostSubnet {
    /// Node name (the record is named after its node).
    #[must_use]
    pub fn node_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Record labels, empty when unset.
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }

    /// Whether either controller-owned field still holds data.
    #[must_use]
    pub fn has_egress_assignment(&self) -> bool {
        !self.egress_cidrs.is_empty() || !self.egress_ips.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmanaged_fields_survive_a_write() {
        let raw = serde_json::json!({
            "metadata": { "name": "worker-1", "resourceVersion": "42" },
            "host": "worker-1",
            "hostIP": "10.1.0.5",
            "subnet": "10.128.2.0/23",
            "egressCIDRs": ["10.1.0.0/24"]
        });

        let mut record: HostSubnet = serde_json::from_value(raw).unwrap();
        assert_eq!(record.node_name(), "worker-1");
        assert!(record.egress_ips.is_empty());

        record.egress_ips = vec!["10.1.0.1".to_string()];
        let written = serde_json::to_value(record.with_type_meta()).unwrap();

        assert_eq!(written["host"], "worker-1");
        assert_eq!(written["subnet"], "10.128.2.0/23");
        assert_eq!(written["hostIP"], "10.1.0.5");
        assert_eq!(written["egressIPs"], serde_json::json!(["10.1.0.1"]));
        assert_eq!(written["apiVersion"], "network.openshift.io/v1");
        assert_eq!(written["kind"], "HostSubnet");
        assert_eq!(written["metadata"]["resourceVersion"], "42");
    }

    #[test]
    fn test_has_egress_assignment() {
        let mut record = HostSubnet::default();
        assert!(!record.has_egress_assignment());
        record.egress_cidrs.push("10.1.0.0/24".to_string());
        assert!(record.has_egress_assignment());
    }
}
