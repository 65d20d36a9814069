//! Controller-specific error types.
//!
//! `ControllerError` is what a reconcile pass or watcher returns.
//! `ReconcileError` is a single per-entity failure inside a pass; a pass
//! collects them into `ReconcileErrors` instead of stopping at the first one.

use std::fmt;

use cluster_client::ClusterError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the EgressIPAM Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Record store error outside of a convergence sweep (e.g. listing records)
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// One or more entities failed during a pass
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileErrors),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Which write a failed unit of work was performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Setting a HostSubnet's `egressCIDRs`
    EgressCidrs,
    /// Setting a HostSubnet's `egressIPs`
    EgressIps,
    /// Clearing both fields on an out-of-scope HostSubnet
    Cleanup,
    /// Clearing a NetNamespace's `egressIPs`
    NetNamespace,
    /// Dropping the association annotation from a Namespace
    Namespace,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::EgressCidrs => "HostSubnet egressCIDRs",
            Self::EgressIps => "HostSubnet egressIPs",
            Self::Cleanup => "HostSubnet cleanup",
            Self::NetNamespace => "NetNamespace egressIPs",
            Self::Namespace => "Namespace annotations",
        };
        f.write_str(kind)
    }
}

/// A single failure attributed to one record, CIDR or policy entry.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A policy entry whose CIDR does not parse; nodes it was meant for never match
    #[error("invalid CIDR '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    /// A `reservedIPs` element that is not an IP address
    #[error("invalid reserved IP '{ip}' for CIDR {cidr}")]
    InvalidReservedIp { cidr: String, ip: String },

    /// A HostSubnet whose `hostIP` is not an IP address
    #[error("HostSubnet {node} has unparsable hostIP '{address}'")]
    InvalidNodeAddress { node: String, address: String },

    /// More than one CIDR contains a node's address
    #[error("HostSubnet {node} ({address}) matches CIDRs {matching:?}; using {}", .matching.first().map_or("", String::as_str))]
    AmbiguousMatch {
        node: String,
        address: String,
        matching: Vec<String>,
    },

    /// A CIDR ran out of free addresses before every node was served
    #[error("CIDR {cidr} has no free egress IPs left for {nodes:?}")]
    AllocationShortfall { cidr: String, nodes: Vec<String> },

    /// The record store rejected a write
    #[error("{kind} write for {record} failed: {source}")]
    Write {
        record: String,
        kind: WriteKind,
        #[source]
        source: ClusterError,
    },

    /// A write task ended without reporting a result
    #[error("{kind} write for {record} aborted: {reason}")]
    Aborted {
        record: String,
        kind: WriteKind,
        reason: String,
    },
}

impl ReconcileError {
    /// Whether this is a policy or cluster configuration issue rather than a write failure.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Write { .. } | Self::Aborted { .. })
    }
}

/// Every failure of one pass, in the order they were observed.
#[derive(Debug, Default)]
pub struct ReconcileErrors(Vec<ReconcileError>);

impl ReconcileErrors {
    /// Create an empty aggregate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure
    pub fn push(&mut self, error: ReconcileError) {
        self.0.push(error);
    }

    /// Number of failures collected
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the pass had no failures
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the collected failures
    pub fn iter(&self) -> std::slice::Iter<'_, ReconcileError> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise the aggregate itself
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Extend<ReconcileError> for ReconcileErrors {
    fn extend<I: IntoIterator<Item = ReconcileError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ReconcileErrors {
    type Item = ReconcileError;
    type IntoIter = std::vec::IntoIter<ReconcileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ReconcileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ReconcileErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_names_every_failure() {
        let mut errors = ReconcileErrors::new();
        errors.push(ReconcileError::Write {
            record: "worker-1".to_string(),
            kind: WriteKind::EgressIps,
            source: ClusterError::Conflict("stale".to_string()),
        });
        errors.push(ReconcileError::AllocationShortfall {
            cidr: "10.1.0.0/30".to_string(),
            nodes: vec!["worker-3".to_string()],
        });

        let message = errors.to_string();
        assert!(message.starts_with("2 error(s): "));
        assert!(message.contains("HostSubnet egressIPs write for worker-1 failed"));
        assert!(message.contains("CIDR 10.1.0.0/30 has no free egress IPs left for [\"worker-3\"]"));
    }

    #[test]
    fn test_into_result() {
        assert!(ReconcileErrors::new().into_result().is_ok());

        let mut errors = ReconcileErrors::new();
        errors.push(ReconcileError::InvalidCidr {
            cidr: "nope".to_string(),
            reason: "invalid IP address syntax".to_string(),
        });
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err.iter().all(ReconcileError::is_configuration));
    }

    #[test]
    fn test_ambiguous_match_names_chosen_cidr() {
        let error = ReconcileError::AmbiguousMatch {
            node: "worker-1".to_string(),
            address: "10.1.0.5".to_string(),
            matching: vec!["10.1.0.0/24".to_string(), "10.0.0.0/8".to_string()],
        };
        assert!(error.to_string().ends_with("using 10.1.0.0/24"));
    }
}
