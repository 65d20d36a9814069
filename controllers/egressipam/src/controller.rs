//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the reconciler to
//! the cluster and runs the EgressIPAM and Namespace watchers.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_client::KubeClusterClient;
use crds::{EgressIPAM, HostSubnet};
use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for EgressIPAM policies.
#[derive(Debug)]
pub struct Controller {
    egress_ipam_watcher: JoinHandle<Result<(), ControllerError>>,
    namespace_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watchers.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing EgressIPAM Controller");

        let kube_client = Client::try_default().await?;

        let egress_ipam_api: Api<EgressIPAM> = Api::all(kube_client.clone());
        let host_subnet_api: Api<HostSubnet> = Api::all(kube_client.clone());
        let namespace_api: Api<Namespace> = Api::all(kube_client.clone());

        let reconciler = Arc::new(Reconciler::new(KubeClusterClient::new(kube_client), &config));

        let watcher_instance = Arc::new(Watcher::new(
            reconciler,
            egress_ipam_api,
            host_subnet_api,
            namespace_api,
            config.resync,
        ));

        let egress_ipam_watcher = {
            let watcher = Arc::clone(&watcher_instance);
            tokio::spawn(async move { watcher.watch_egress_ipams().await })
        };

        let namespace_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move { watcher.watch_namespaces().await })
        };

        Ok(Self {
            egress_ipam_watcher,
            namespace_watcher,
        })
    }

    /// Runs the controller until a watcher exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("EgressIPAM Controller running");

        // Watchers run forever; either one returning is fatal
        tokio::select! {
            result = &mut self.egress_ipam_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("EgressIPAM watcher panicked: {e}")))??;
            }
            result = &mut self.namespace_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Namespace watcher panicked: {e}")))??;
            }
        }

        Ok(())
    }
}
