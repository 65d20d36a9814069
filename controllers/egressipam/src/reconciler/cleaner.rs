//! Clearing HostSubnets that fell out of a policy's scope.

use tracing::debug;

use super::Reconciler;
use super::applier::fan_out;
use super::context::ReconcileContext;
use crate::error::WriteKind;

impl Reconciler {
    /// Empty `egressCIDRs` and `egressIPs` on every unselected record still holding either.
    pub async fn remove_egress_from_unselected_host_subnets(&self, rc: &mut ReconcileContext) {
        let mut units = Vec::new();
        for record in rc.unselected_host_subnets() {
            if !record.has_egress_assignment() {
                continue;
            }
            debug!(
                "HostSubnet {} left scope, clearing egressCIDRs {:?} and egressIPs {:?}",
                record.node_name(),
                record.egress_cidrs,
                record.egress_ips
            );
            let mut record = record.clone();
            record.egress_cidrs.clear();
            record.egress_ips.clear();
            units.push(self.host_subnet_write(record, WriteKind::Cleanup));
        }

        for outcome in fan_out(units, self.write_permits.clone()).await {
            match outcome {
                Ok(updated) => {
                    rc.writes += 1;
                    rc.all_host_subnets.insert(updated.node_name().to_string(), updated);
                }
                Err(e) => rc.errors.push(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::test_utils::*;
    use cluster_client::mock::HOST_SUBNET;
    use cluster_client::{ClusterClientTrait, MockClusterClient};

    #[tokio::test]
    async fn test_failed_cleanup_does_not_stop_other_records() {
        let client = MockClusterClient::new();
        client.add_host_subnet(with_egress(
            create_test_host_subnet("node-d", "172.16.0.4"),
            &["172.16.0.0/24"],
            &["172.16.0.10"],
        ));
        client.add_host_subnet(with_egress(
            create_test_host_subnet("node-e", "172.16.0.5"),
            &["172.16.0.0/24"],
            &["172.16.0.11"],
        ));
        client.fail_writes_for("node-d");

        let records = client.list_host_subnets().await.unwrap();
        let mut rc = ReconcileContext::new(create_test_egress_ipam("eipam", &["10.1.0.0/24"]), records);
        create_test_reconciler(&client)
            .remove_egress_from_unselected_host_subnets(&mut rc)
            .await;

        assert_eq!(rc.writes, 1);
        assert_eq!(client.writes(HOST_SUBNET), 1);
        assert!(!client.host_subnet("node-e").unwrap().has_egress_assignment());
        assert!(!rc.all_host_subnets["node-e"].has_egress_assignment());
        assert_eq!(
            client.host_subnet("node-d").unwrap().egress_ips,
            vec!["172.16.0.10".to_string()]
        );

        let failed: Vec<&ReconcileError> = rc.errors.iter().collect();
        assert!(matches!(
            &failed[..],
            [ReconcileError::Write { record, kind: WriteKind::Cleanup, .. }] if record == "node-d"
        ));
    }
}
