//! Unit tests for namespace association cleanup

#[cfg(test)]
mod tests {
    use crate::error::{ControllerError, ReconcileError, WriteKind};
    use crate::reconciler::namespace::NamespaceTransitionTracker;
    use crate::test_utils::*;
    use cluster_client::MockClusterClient;
    use cluster_client::mock::{NAMESPACE, NET_NAMESPACE};
    use crds::{NAMESPACE_ANNOTATION, NAMESPACE_ASSOCIATION_ANNOTATION};
    use kube::ResourceExt;

    #[test]
    fn test_tracker_only_fires_on_removal() {
        let mut tracker = NamespaceTransitionTracker::new();
        let annotated = create_test_namespace("team-a", &[(NAMESPACE_ANNOTATION, "eipam")]);
        let plain = create_test_namespace("team-a", &[]);

        // Never seen annotated
        assert!(!tracker.observe(&plain));
        // Gains the annotation, then steady state
        assert!(!tracker.observe(&annotated));
        assert!(!tracker.observe(&annotated));
        assert!(tracker.is_tracked("team-a"));
        // Loses it once
        assert!(tracker.observe(&plain));
        assert!(!tracker.observe(&plain));
        assert!(!tracker.is_tracked("team-a"));
    }

    #[test]
    fn test_tracker_initial_listing_only_seeds() {
        let mut tracker = NamespaceTransitionTracker::new();
        tracker.begin_resync();
        assert!(!tracker.observe(&create_test_namespace("team-a", &[(NAMESPACE_ANNOTATION, "eipam")])));
        assert!(!tracker.observe(&create_test_namespace("team-b", &[])));
        tracker.finish_resync();

        assert!(tracker.is_tracked("team-a"));
        assert!(!tracker.is_tracked("team-b"));
    }

    #[test]
    fn test_tracker_forgets_deleted_and_unlisted_namespaces() {
        let mut tracker = NamespaceTransitionTracker::new();
        tracker.observe(&create_test_namespace("team-a", &[(NAMESPACE_ANNOTATION, "eipam")]));
        tracker.observe(&create_test_namespace("team-b", &[(NAMESPACE_ANNOTATION, "eipam")]));

        tracker.forget("team-a");
        assert!(!tracker.is_tracked("team-a"));
        // Recreated without the annotation: not a transition
        assert!(!tracker.observe(&create_test_namespace("team-a", &[])));

        // Relisting without team-b drops it
        tracker.begin_resync();
        tracker.observe(&create_test_namespace("team-a", &[]));
        tracker.finish_resync();
        assert!(!tracker.is_tracked("team-b"));
    }

    #[tokio::test]
    async fn test_cleanup_clears_net_namespace_and_annotation() {
        let client = MockClusterClient::new();
        client.add_namespace(create_test_namespace(
            "team-a",
            &[(NAMESPACE_ASSOCIATION_ANNOTATION, "10.1.0.20"), ("owner", "team-a")],
        ));
        client.add_net_namespace(create_test_net_namespace("team-a", &["10.1.0.20"]));

        create_test_reconciler(&client)
            .reconcile_namespace("team-a")
            .await
            .unwrap();

        let record = client.net_namespace("team-a").unwrap();
        assert!(record.egress_ips.is_empty());
        assert_eq!(record.extra["netname"], "team-a");

        let namespace = client.namespace("team-a").unwrap();
        assert!(!namespace.annotations().contains_key(NAMESPACE_ASSOCIATION_ANNOTATION));
        assert_eq!(namespace.annotations()["owner"], "team-a");
        assert_eq!(client.writes(NET_NAMESPACE), 1);
        assert_eq!(client.writes(NAMESPACE), 1);
    }

    #[tokio::test]
    async fn test_cleanup_is_a_no_op_when_converged() {
        let client = MockClusterClient::new();
        client.add_namespace(create_test_namespace("team-a", &[]));
        client.add_net_namespace(create_test_net_namespace("team-a", &[]));
        let reconciler = create_test_reconciler(&client);

        reconciler.reconcile_namespace("team-a").await.unwrap();
        // Missing Namespace and missing NetNamespace are both converged
        reconciler.reconcile_namespace("ghost").await.unwrap();
        client.add_namespace(create_test_namespace("team-b", &[]));
        reconciler.reconcile_namespace("team-b").await.unwrap();

        assert_eq!(client.writes(NET_NAMESPACE), 0);
        assert_eq!(client.writes(NAMESPACE), 0);
    }

    #[tokio::test]
    async fn test_cleanup_skips_reassociated_namespace() {
        let client = MockClusterClient::new();
        client.add_namespace(create_test_namespace("team-a", &[(NAMESPACE_ANNOTATION, "eipam")]));
        client.add_net_namespace(create_test_net_namespace("team-a", &["10.1.0.20"]));

        create_test_reconciler(&client)
            .reconcile_namespace("team-a")
            .await
            .unwrap();

        assert_eq!(client.net_namespace("team-a").unwrap().egress_ips, vec!["10.1.0.20".to_string()]);
        assert_eq!(client.writes(NET_NAMESPACE), 0);
    }

    #[tokio::test]
    async fn test_cleanup_attempts_both_writes() {
        let client = MockClusterClient::new();
        client.add_namespace(create_test_namespace(
            "team-a",
            &[(NAMESPACE_ASSOCIATION_ANNOTATION, "10.1.0.20")],
        ));
        client.add_net_namespace(create_test_net_namespace("team-a", &["10.1.0.20"]));
        client.fail_writes_for("team-a");

        let result = create_test_reconciler(&client)
            .reconcile_namespace("team-a")
            .await;

        let errors = match result {
            Err(ControllerError::Reconcile(errors)) => errors,
            other => panic!("expected aggregated errors, got {other:?}"),
        };
        let kinds: Vec<WriteKind> = errors
            .iter()
            .filter_map(|e| match e {
                ReconcileError::Write { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![WriteKind::NetNamespace, WriteKind::Namespace]);
    }
}
