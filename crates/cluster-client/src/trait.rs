//! ClusterClient trait for mocking
//!
//! This trait abstracts the record store to enable mocking in unit tests.
//! The concrete KubeClusterClient implements this trait, and tests use MockClusterClient.

use crate::error::ClusterError;
use crds::{EgressIPAM, EgressIPAMStatus, HostSubnet, NetNamespace};
use k8s_openapi::api::core::v1::Namespace;

/// Trait for cluster record store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime;
/// the reconciler fans writes out across spawned tasks.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Policies
    async fn get_egress_ipam(&self, name: &str) -> Result<EgressIPAM, ClusterError>;
    async fn patch_egress_ipam_status(&self, name: &str, status: &EgressIPAMStatus) -> Result<(), ClusterError>;

    // Subnet records
    async fn list_host_subnets(&self) -> Result<Vec<HostSubnet>, ClusterError>;
    async fn update_host_subnet(&self, record: &HostSubnet) -> Result<HostSubnet, ClusterError>;

    // Namespaces
    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError>;
    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError>;
    async fn get_net_namespace(&self, name: &str) -> Result<NetNamespace, ClusterError>;
    async fn update_net_namespace(&self, record: &NetNamespace) -> Result<NetNamespace, ClusterError>;
}
