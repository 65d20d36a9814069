//! EgressIPAM CRD Definitions
//!
//! Kubernetes types consumed and written by the EgressIPAM controller:
//! - `EgressIPAM`: the policy partitioning CIDRs across nodes
//! - `HostSubnet`: the per-node record carrying egress CIDRs and IPs
//! - `NetNamespace`: the per-namespace record carrying egress IPs

/// Implements `kube::Resource` for a cluster-scoped `network.openshift.io/v1`
/// object whose payload lives at the top level (no `spec`).
macro_rules! openshift_network_resource {
    ($ty:ty, $kind:literal, $plural:literal) => {
        impl kube::Resource for $ty {
            type DynamicType = ();
            type Scope = kube::core::ClusterResourceScope;

            fn kind(_: &()) -> std::borrow::Cow<'_, str> {
                std::borrow::Cow::Borrowed($kind)
            }

            fn group(_: &()) -> std::borrow::Cow<'_, str> {
                std::borrow::Cow::Borrowed($crate::OPENSHIFT_NETWORK_GROUP)
            }

            fn version(_: &()) -> std::borrow::Cow<'_, str> {
                std::borrow::Cow::Borrowed($crate::OPENSHIFT_NETWORK_VERSION)
            }

            fn plural(_: &()) -> std::borrow::Cow<'_, str> {
                std::borrow::Cow::Borrowed($plural)
            }

            fn meta(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &mut self.metadata
            }
        }

        impl $ty {
            /// Fills `apiVersion` and `kind`, which list responses may omit
            /// but writes require.
            #[must_use]
            pub fn with_type_meta(mut self) -> Self {
                self.api_version = Some(format!(
                    "{}/{}",
                    $crate::OPENSHIFT_NETWORK_GROUP,
                    $crate::OPENSHIFT_NETWORK_VERSION
                ));
                self.kind = Some($kind.to_string());
                self
            }
        }
    };
}
pub(crate) use openshift_network_resource;

pub mod annotations;
pub mod egress_ipam;
pub mod host_subnet;
pub mod net_namespace;

pub use annotations::*;
pub use egress_ipam::*;
pub use host_subnet::*;
pub use net_namespace::*;

/// API group of the OpenShift SDN network objects.
pub const OPENSHIFT_NETWORK_GROUP: &str = "network.openshift.io";

/// API version of the OpenShift SDN network objects.
pub const OPENSHIFT_NETWORK_VERSION: &str = "v1";
