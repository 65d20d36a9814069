//! Kubernetes-backed record store client

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{EgressIPAM, EgressIPAMStatus, HostSubnet, NetNamespace};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Record store client backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a client from an existing Kubernetes client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn egress_ipams(&self) -> Api<EgressIPAM> {
        Api::all(self.client.clone())
    }

    fn host_subnets(&self) -> Api<HostSubnet> {
        Api::all(self.client.clone())
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn net_namespaces(&self) -> Api<NetNamespace> {
        Api::all(self.client.clone())
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_egress_ipam(&self, name: &str) -> Result<EgressIPAM, ClusterError> {
        Ok(self.egress_ipams().get(name).await?)
    }

    async fn patch_egress_ipam_status(&self, name: &str, status: &EgressIPAMStatus) -> Result<(), ClusterError> {
        let status_patch = serde_json::json!({ "status": status });
        self.egress_ipams()
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await?;
        debug!("Patched EgressIPAM {} status", name);
        Ok(())
    }

    async fn list_host_subnets(&self) -> Result<Vec<HostSubnet>, ClusterError> {
        let list = self.host_subnets().list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn update_host_subnet(&self, record: &HostSubnet) -> Result<HostSubnet, ClusterError> {
        let name = record.name_any();
        let updated = self
            .host_subnets()
            .replace(&name, &PostParams::default(), &record.clone().with_type_meta())
            .await?;
        debug!("Replaced HostSubnet {} (resourceVersion {:?})", name, updated.resource_version());
        Ok(updated)
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        Ok(self.namespaces().get(name).await?)
    }

    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        let name = namespace.name_any();
        let updated = self
            .namespaces()
            .replace(&name, &PostParams::default(), namespace)
            .await?;
        debug!("Replaced Namespace {}", name);
        Ok(updated)
    }

    async fn get_net_namespace(&self, name: &str) -> Result<NetNamespace, ClusterError> {
        Ok(self.net_namespaces().get(name).await?)
    }

    async fn update_net_namespace(&self, record: &NetNamespace) -> Result<NetNamespace, ClusterError> {
        let name = record.name_any();
        let updated = self
            .net_namespaces()
            .replace(&name, &PostParams::default(), &record.clone().with_type_meta())
            .await?;
        debug!("Replaced NetNamespace {}", name);
        Ok(updated)
    }
}
