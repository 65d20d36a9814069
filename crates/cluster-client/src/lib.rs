//! Cluster Record Store Client
//!
//! Reads and writes the cluster objects the EgressIPAM controller works on:
//! `EgressIPAM` policies, `HostSubnet` and `NetNamespace` records, and
//! `Namespace` objects.
//!
//! The controller only depends on [`ClusterClientTrait`]. [`KubeClusterClient`]
//! talks to the API server; [`MockClusterClient`] (feature `test-util`) keeps
//! everything in memory for unit tests.
//!
//! Writes use replace semantics and carry the object's `resourceVersion`, so
//! a write based on a stale read is rejected with [`ClusterError::Conflict`].

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockClusterClient;
