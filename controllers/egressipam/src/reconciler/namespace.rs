//! Namespace association cleanup.
//!
//! When a namespace drops the EgressIPAM association annotation its
//! NetNamespace must stop using egress IPs, and the annotation recording
//! the handed out IPs must go.

use std::collections::HashSet;

use crds::{NAMESPACE_ANNOTATION, NAMESPACE_ASSOCIATION_ANNOTATION};
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use tracing::{debug, error, info};

use super::Reconciler;
use crate::error::{ControllerError, ReconcileError, ReconcileErrors, WriteKind};

/// Whether `namespace` carries the association annotation.
#[must_use]
pub fn is_associated(namespace: &Namespace) -> bool {
    namespace.annotations().contains_key(NAMESPACE_ANNOTATION)
}

/// Detects namespaces whose association annotation was removed.
///
/// Only a namespace last seen annotated and now seen without the annotation
/// counts as a transition. The first listing has nothing to compare with, so
/// it only seeds the tracker.
#[derive(Debug, Default)]
pub struct NamespaceTransitionTracker {
    annotated: HashSet<String>,
    relisted: Option<HashSet<String>>,
}

impl NamespaceTransitionTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state of `namespace`; true when cleanup is due.
    pub fn observe(&mut self, namespace: &Namespace) -> bool {
        let name = namespace.name_any();
        if let Some(seen) = self.relisted.as_mut() {
            seen.insert(name.clone());
        }
        if is_associated(namespace) {
            self.annotated.insert(name);
            false
        } else {
            self.annotated.remove(&name)
        }
    }

    /// Keep `name` pending so its next observation fires again.
    pub fn retry(&mut self, name: &str) {
        self.annotated.insert(name.to_string());
    }

    /// Stop tracking a deleted namespace.
    pub fn forget(&mut self, name: &str) {
        self.annotated.remove(name);
    }

    /// A full relisting starts; namespaces it does not mention are dropped by
    /// [`Self::finish_resync`].
    pub fn begin_resync(&mut self) {
        self.relisted = Some(HashSet::new());
    }

    /// The relisting is complete.
    pub fn finish_resync(&mut self) {
        if let Some(seen) = self.relisted.take() {
            self.annotated.retain(|name| seen.contains(name));
        }
    }

    /// Whether `name` was last seen annotated
    #[cfg(test)]
    #[must_use]
    pub fn is_tracked(&self, name: &str) -> bool {
        self.annotated.contains(name)
    }
}

impl Reconciler {
    /// Clear egress state left behind by a namespace that left its policy.
    ///
    /// Both the NetNamespace and the Namespace write are attempted; their
    /// failures are returned together.
    pub async fn reconcile_namespace(&self, name: &str) -> Result<(), ControllerError> {
        let mut namespace = match self.client.get_namespace(name).await {
            Ok(namespace) => namespace,
            Err(e) if e.is_not_found() => {
                debug!("Namespace {} no longer exists, nothing to clean up", name);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if is_associated(&namespace) {
            debug!("Namespace {} is associated again, skipping cleanup", name);
            return Ok(());
        }

        let mut errors = ReconcileErrors::new();

        match self.client.get_net_namespace(name).await {
            Ok(mut record) if !record.egress_ips.is_empty() => {
                debug!("Clearing egressIPs {:?} from NetNamespace {}", record.egress_ips, name);
                record.egress_ips.clear();
                match self.client.update_net_namespace(&record).await {
                    Ok(_) => info!("Cleared egressIPs of NetNamespace {}", name),
                    Err(source) => {
                        error!("Failed to clear egressIPs of NetNamespace {}: {}", name, source);
                        errors.push(ReconcileError::Write {
                            record: name.to_string(),
                            kind: WriteKind::NetNamespace,
                            source,
                        });
                    }
                }
            }
            Ok(_) => debug!("NetNamespace {} has no egressIPs", name),
            Err(e) if e.is_not_found() => debug!("NetNamespace {} not found, nothing to clear", name),
            Err(source) => {
                error!("Failed to read NetNamespace {}: {}", name, source);
                errors.push(ReconcileError::Write {
                    record: name.to_string(),
                    kind: WriteKind::NetNamespace,
                    source,
                });
            }
        }

        let had_ips_annotation = namespace
            .annotations_mut()
            .remove(NAMESPACE_ASSOCIATION_ANNOTATION)
            .is_some();
        if had_ips_annotation {
            match self.client.update_namespace(&namespace).await {
                Ok(_) => info!("Removed {} from Namespace {}", NAMESPACE_ASSOCIATION_ANNOTATION, name),
                Err(source) => {
                    error!("Failed to update Namespace {}: {}", name, source);
                    errors.push(ReconcileError::Write {
                        record: name.to_string(),
                        kind: WriteKind::Namespace,
                        source,
                    });
                }
            }
        }

        errors.into_result().map_err(ControllerError::from)
    }
}
