//! NetNamespace record
//!
//! One per namespace. The controller only ever clears `egressIPs`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Per-namespace network record (`network.openshift.io/v1`, cluster scoped).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetNamespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Egress IPs used by pods of the namespace
    #[serde(default, rename = "egressIPs")]
    pub egress_ips: Vec<String>,

    /// Fields not managed by the controller (`netname`, `netid`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

crate::openshift_network_resource!(NetNamespace, "NetNamespace", "netnamespaces");
