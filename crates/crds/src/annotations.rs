//! Namespace annotations understood by the controller.

/// Marks a namespace as associated with an `EgressIPAM` policy.
///
/// Removing it from a namespace triggers cleanup of the namespace's
/// `NetNamespace` egress IPs.
pub const NAMESPACE_ANNOTATION: &str = "egressip-ipam-operator.redhat-cop.io/egressipam";

/// Records the egress IPs handed to an associated namespace.
pub const NAMESPACE_ASSOCIATION_ANNOTATION: &str = "egressip-ipam-operator.redhat-cop.io/egressips";
