//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::config::ControllerConfig;
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use cluster_client::MockClusterClient;
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::api::core::v1::Namespace;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::collections::BTreeMap;

#[cfg(test)]
fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Helper to create a test EgressIPAM with one entry per CIDR
#[cfg(test)]
pub fn create_test_egress_ipam(name: &str, cidrs: &[&str]) -> EgressIPAM {
    EgressIPAM {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: EgressIPAMSpec {
            cidr_assignments: cidrs
                .iter()
                .map(|cidr| CIDRAssignment {
                    cidr: (*cidr).to_string(),
                    ..Default::default()
                })
                .collect(),
        },
        status: None,
    }
}

/// Helper to create a test HostSubnet without egress assignment
#[cfg(test)]
pub fn create_test_host_subnet(name: &str, host_ip: &str) -> HostSubnet {
    let mut extra = BTreeMap::new();
    extra.insert("host".to_string(), serde_json::json!(name));
    extra.insert("subnet".to_string(), serde_json::json!("10.128.0.0/23"));

    HostSubnet {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        host_ip: host_ip.to_string(),
        extra,
        ..Default::default()
    }
}

/// Set `egressCIDRs` and `egressIPs` on a test HostSubnet
#[cfg(test)]
pub fn with_egress(mut record: HostSubnet, cidrs: &[&str], ips: &[&str]) -> HostSubnet {
    record.egress_cidrs = strings(cidrs);
    record.egress_ips = strings(ips);
    record
}

/// Add labels to a test HostSubnet
#[cfg(test)]
pub fn with_labels(mut record: HostSubnet, labels: &[(&str, &str)]) -> HostSubnet {
    record.metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    );
    record
}

/// Helper to create a test Namespace with the given annotations
#[cfg(test)]
pub fn create_test_namespace(name: &str, annotations: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations: (!annotations.is_empty()).then(|| {
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect()
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Helper to create a test NetNamespace
#[cfg(test)]
pub fn create_test_net_namespace(name: &str, egress_ips: &[&str]) -> NetNamespace {
    let mut extra = BTreeMap::new();
    extra.insert("netname".to_string(), serde_json::json!(name));
    extra.insert("netid".to_string(), serde_json::json!(4_242_424));

    NetNamespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        egress_ips: strings(egress_ips),
        extra,
        ..Default::default()
    }
}

/// Helper to create a test reconciler backed by `client`
#[cfg(test)]
pub fn create_test_reconciler(client: &MockClusterClient) -> Reconciler {
    Reconciler::new(client.clone(), &ControllerConfig::default())
}
