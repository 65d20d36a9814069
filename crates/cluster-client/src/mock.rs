//! Mock ClusterClient for unit testing
//!
//! Stores objects in memory, hands out increasing `resourceVersion`s and
//! rejects stale writes the way the API server does. Tests can count writes
//! per kind and make writes to chosen objects fail.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{EgressIPAM, EgressIPAMStatus, HostSubnet, NetNamespace};
use k8s_openapi::api::core::v1::Namespace;
use kube::{Resource, ResourceExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Write counter key for HostSubnet replaces
pub const HOST_SUBNET: &str = "HostSubnet";
/// Write counter key for NetNamespace replaces
pub const NET_NAMESPACE: &str = "NetNamespace";
/// Write counter key for Namespace replaces
pub const NAMESPACE: &str = "Namespace";
/// Write counter key for EgressIPAM status patches
pub const EGRESS_IPAM_STATUS: &str = "EgressIPAMStatus";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock ClusterClient for testing
#[derive(Clone, Debug, Default)]
pub struct MockClusterClient {
    pub(crate) egress_ipams: Arc<Mutex<HashMap<String, EgressIPAM>>>,
    pub(crate) host_subnets: Arc<Mutex<HashMap<String, HostSubnet>>>,
    pub(crate) namespaces: Arc<Mutex<HashMap<String, Namespace>>>,
    pub(crate) net_namespaces: Arc<Mutex<HashMap<String, NetNamespace>>>,
    // Object names whose writes fail with an API error
    pub(crate) failing_writes: Arc<Mutex<HashSet<String>>>,
    pub(crate) fail_lists: Arc<AtomicBool>,
    pub(crate) writes: Arc<Mutex<HashMap<&'static str, usize>>>,
    pub(crate) resource_version: Arc<AtomicU64>,
}

impl MockClusterClient {
    /// Create an empty mock store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn stamp<K: Resource>(&self, object: &mut K) {
        object.meta_mut().resource_version = Some(self.next_resource_version());
    }

    /// Add a policy (for test setup)
    pub fn add_egress_ipam(&self, mut policy: EgressIPAM) {
        self.stamp(&mut policy);
        lock(&self.egress_ipams).insert(policy.name_any(), policy);
    }

    /// Add a HostSubnet record (for test setup)
    pub fn add_host_subnet(&self, mut record: HostSubnet) {
        self.stamp(&mut record);
        lock(&self.host_subnets).insert(record.name_any(), record);
    }

    /// Add a Namespace (for test setup)
    pub fn add_namespace(&self, mut namespace: Namespace) {
        self.stamp(&mut namespace);
        lock(&self.namespaces).insert(namespace.name_any(), namespace);
    }

    /// Add a NetNamespace record (for test setup)
    pub fn add_net_namespace(&self, mut record: NetNamespace) {
        self.stamp(&mut record);
        lock(&self.net_namespaces).insert(record.name_any(), record);
    }

    /// Current stored policy
    #[must_use]
    pub fn egress_ipam(&self, name: &str) -> Option<EgressIPAM> {
        lock(&self.egress_ipams).get(name).cloned()
    }

    /// Current stored HostSubnet
    #[must_use]
    pub fn host_subnet(&self, name: &str) -> Option<HostSubnet> {
        lock(&self.host_subnets).get(name).cloned()
    }

    /// Current stored Namespace
    #[must_use]
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        lock(&self.namespaces).get(name).cloned()
    }

    /// Current stored NetNamespace
    #[must_use]
    pub fn net_namespace(&self, name: &str) -> Option<NetNamespace> {
        lock(&self.net_namespaces).get(name).cloned()
    }

    /// Make every write to the named object fail
    pub fn fail_writes_for(&self, name: &str) {
        lock(&self.failing_writes).insert(name.to_string());
    }

    /// Let writes succeed again
    pub fn clear_write_failures(&self) {
        lock(&self.failing_writes).clear();
    }

    /// Make list calls fail
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Successful writes of the given kind since creation or the last reset
    #[must_use]
    pub fn writes(&self, kind: &str) -> usize {
        lock(&self.writes).get(kind).copied().unwrap_or_default()
    }

    /// Reset the write counters
    pub fn reset_writes(&self) {
        lock(&self.writes).clear();
    }

    fn check_injected_failure(&self, name: &str) -> Result<(), ClusterError> {
        if lock(&self.failing_writes).contains(name) {
            return Err(ClusterError::Api(format!("injected write failure for {name}")));
        }
        Ok(())
    }

    /// Replace `object` in `store`, enforcing optimistic concurrency
    fn replace<K>(
        &self,
        store: &Mutex<HashMap<String, K>>,
        kind: &'static str,
        object: &K,
    ) -> Result<K, ClusterError>
    where
        K: Resource + Clone,
    {
        let name = object.meta().name.clone().unwrap_or_default();
        self.check_injected_failure(&name)?;

        let mut objects = lock(store);
        let current = objects
            .get(&name)
            .ok_or_else(|| ClusterError::NotFound(format!("{kind} {name} not found")))?;

        let incoming = object.meta().resource_version.as_deref();
        let stored = current.meta().resource_version.as_deref();
        if incoming.is_some() && incoming != stored {
            return Err(ClusterError::Conflict(format!(
                "{kind} {name}: resourceVersion {} is stale (current {})",
                incoming.unwrap_or_default(),
                stored.unwrap_or_default()
            )));
        }

        let mut updated = object.clone();
        self.stamp(&mut updated);
        objects.insert(name, updated.clone());
        drop(objects);

        *lock(&self.writes).entry(kind).or_default() += 1;
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_egress_ipam(&self, name: &str) -> Result<EgressIPAM, ClusterError> {
        self.egress_ipam(name)
            .ok_or_else(|| ClusterError::NotFound(format!("EgressIPAM {name} not found")))
    }

    async fn patch_egress_ipam_status(&self, name: &str, status: &EgressIPAMStatus) -> Result<(), ClusterError> {
        self.check_injected_failure(name)?;
        let mut policies = lock(&self.egress_ipams);
        let policy = policies
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(format!("EgressIPAM {name} not found")))?;
        policy.status = Some(status.clone());
        drop(policies);

        *lock(&self.writes).entry(EGRESS_IPAM_STATUS).or_default() += 1;
        Ok(())
    }

    async fn list_host_subnets(&self) -> Result<Vec<HostSubnet>, ClusterError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(ClusterError::Api("injected list failure".to_string()));
        }
        Ok(lock(&self.host_subnets).values().cloned().collect())
    }

    async fn update_host_subnet(&self, record: &HostSubnet) -> Result<HostSubnet, ClusterError> {
        self.replace(&self.host_subnets, HOST_SUBNET, record)
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        self.namespace(name)
            .ok_or_else(|| ClusterError::NotFound(format!("Namespace {name} not found")))
    }

    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        self.replace(&self.namespaces, NAMESPACE, namespace)
    }

    async fn get_net_namespace(&self, name: &str) -> Result<NetNamespace, ClusterError> {
        self.net_namespace(name)
            .ok_or_else(|| ClusterError::NotFound(format!("NetNamespace {name} not found")))
    }

    async fn update_net_namespace(&self, record: &NetNamespace) -> Result<NetNamespace, ClusterError> {
        self.replace(&self.net_namespaces, NET_NAMESPACE, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn record(name: &str) -> HostSubnet {
        HostSubnet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            host_ip: "10.1.0.5".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let client = MockClusterClient::new();
        client.add_host_subnet(record("worker-1"));

        let read = client.list_host_subnets().await.unwrap().remove(0);
        let mut first = read.clone();
        first.egress_ips = vec!["10.1.0.1".to_string()];
        client.update_host_subnet(&first).await.unwrap();

        let mut second = read;
        second.egress_ips = vec!["10.1.0.2".to_string()];
        let err = client.update_host_subnet(&second).await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err}");

        assert_eq!(client.writes(HOST_SUBNET), 1);
        assert_eq!(client.host_subnet("worker-1").unwrap().egress_ips, vec!["10.1.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let client = MockClusterClient::new();
        client.add_host_subnet(record("worker-1"));
        client.fail_writes_for("worker-1");

        let read = client.host_subnet("worker-1").unwrap();
        let err = client.update_host_subnet(&read).await.unwrap_err();
        assert!(matches!(err, ClusterError::Api(_)));
        assert_eq!(client.writes(HOST_SUBNET), 0);

        client.clear_write_failures();
        client.update_host_subnet(&read).await.unwrap();
        assert_eq!(client.writes(HOST_SUBNET), 1);
    }

    #[tokio::test]
    async fn test_missing_objects_are_not_found() {
        let client = MockClusterClient::new();
        assert!(client.get_namespace("ghost").await.unwrap_err().is_not_found());
        assert!(client.get_net_namespace("ghost").await.unwrap_err().is_not_found());
        assert!(client.get_egress_ipam("ghost").await.unwrap_err().is_not_found());
    }
}
