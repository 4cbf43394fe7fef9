mod common;

use common::*;
use infraflow_cloud::{CloudError, ErrorClass, FileStateStore, StatePersister};
use infraflow_reconciler::{FlowContext, FlowContextOptions, ReconcileError, delete, keys};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn test_delete_removes_everything_in_order() {
    for cloud in FakeCloud::all() {
        let created = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        cloud.clear_calls();

        let result = context(&cloud, default_config(), created.state)
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty(), "{}: {:?}", cloud.name(), result.state);
        assert!(result.status.is_empty());

        let calls = cloud.mutating_calls();
        let detach = position(&calls, cloud.detach_op());
        assert!(detach < position(&calls, "delete_router"), "{:#?}", calls);
        assert!(detach < position(&calls, "delete_subnet"), "{:#?}", calls);
        assert!(position(&calls, "delete_subnet") < position(&calls, "delete_network"));
        assert_eq!(count(&calls, "delete_security_group"), 1);
        assert_eq!(count(&calls, "delete_keypair"), 1);

        let providers = cloud.providers();
        assert!(providers
            .network
            .list_networks_by_name(TECHNICAL_ID)
            .await
            .unwrap()
            .is_empty());
        assert!(providers
            .router
            .list_routers_by_name(TECHNICAL_ID)
            .await
            .unwrap()
            .is_empty());
        assert!(providers
            .security_group
            .list_security_groups_by_name(TECHNICAL_ID)
            .await
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn test_delete_without_state_does_nothing() {
    for cloud in FakeCloud::all() {
        let result = context(&cloud, default_config(), BTreeMap::new())
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty());
        assert!(cloud.mutating_calls().is_empty(), "{}", cloud.name());
    }
}

#[tokio::test]
async fn test_delete_recovers_lost_ids_by_name() {
    for cloud in FakeCloud::all() {
        context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();

        // a crash right after the root marker was written
        let state = BTreeMap::from([(keys::RESOURCES_EXIST.to_string(), "true".to_string())]);
        let result = context(&cloud, default_config(), state)
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty());

        let calls = cloud.mutating_calls();
        for op in [
            "delete_router",
            "delete_subnet",
            "delete_network",
            "delete_security_group",
        ] {
            assert_eq!(count(&calls, op), 1, "{}: {}", cloud.name(), op);
        }
    }
}

#[tokio::test]
async fn test_delete_tolerates_resources_already_gone() {
    for cloud in FakeCloud::all() {
        let created = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        context(&cloud, default_config(), created.state.clone())
            .delete()
            .await
            .unwrap();

        // stale state of an earlier run
        let result = context(&cloud, default_config(), created.state)
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty(), "{}", cloud.name());
    }
}

#[tokio::test]
async fn test_remaining_servers_block_delete() {
    for cloud in FakeCloud::all() {
        let created = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        let network_id = created.status.network.clone().unwrap().id;
        let server = cloud.add_server("worker-0", &network_id);
        cloud.clear_calls();

        let ctx = context(&cloud, default_config(), created.state);
        let err = ctx.delete().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Dependency, "{}", cloud.name());
        let ReconcileError::Flow(flow) = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(flow.failure_of(delete::CHECK_REMAINING_SERVERS).is_some());
        match flow.find_cause::<CloudError>() {
            Some(CloudError::Dependency(message)) => assert!(message.contains("worker-0")),
            other => panic!("unexpected cause: {:?}", other),
        }

        let calls = cloud.mutating_calls();
        assert_eq!(count(&calls, "delete_subnet"), 0);
        assert_eq!(count(&calls, "delete_network"), 0);
        assert_eq!(count(&calls, "delete_security_group"), 0);

        let state = ctx.export_state();
        assert_eq!(state.get(keys::NETWORK), Some(&network_id));
        assert!(state.contains_key(keys::RESOURCES_EXIST));

        cloud.remove_server(&server);
        let result = context(&cloud, default_config(), state)
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty(), "{}", cloud.name());
        assert!(cloud
            .providers()
            .network
            .get_network(&network_id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}

#[tokio::test]
async fn test_network_still_in_use_is_a_dependency() {
    for cloud in FakeCloud::all() {
        let created = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        let network_id = created.status.network.clone().unwrap().id;

        // a subnet someone else added to the cluster network
        let providers = cloud.providers();
        let foreign = providers
            .network
            .create_subnet(&infraflow_cloud::SubnetSpec {
                name: "foreign".to_string(),
                network_id: network_id.clone(),
                cidr: "10.251.0.0/16".to_string(),
                ip_version: 4,
                dns_nameservers: vec![],
            })
            .await
            .unwrap();

        let ctx = context(&cloud, default_config(), created.state);
        let err = ctx.delete().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Dependency, "{}: {}", cloud.name(), err);
        assert!(!err.is_retryable());
        let ReconcileError::Flow(flow) = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(flow.failure_of(delete::DELETE_NETWORK).is_some());
        assert_eq!(ctx.export_state().get(keys::NETWORK), Some(&network_id));

        providers.network.delete_subnet(&foreign.id).await.unwrap();
        let result = context(&cloud, default_config(), ctx.export_state())
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty(), "{}", cloud.name());
    }
}

#[tokio::test]
async fn test_pinned_network_is_never_deleted() {
    for cloud in FakeCloud::all() {
        let network = cloud
            .providers()
            .network
            .create_network(&infraflow_cloud::NetworkSpec {
                name: "landing-zone".to_string(),
                admin_state_up: true,
            })
            .await
            .unwrap();
        let config_yaml = format!(
            r#"
floatingPoolName: fip-1
networks:
  id: {}
  workers: 10.250.0.0/16
"#,
            network.id
        );

        let created = context(&cloud, config(&config_yaml), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        assert_eq!(created.status.network.as_ref().unwrap().id, network.id);

        let states = [
            created.state.clone(),
            BTreeMap::from([(keys::RESOURCES_EXIST.to_string(), "true".to_string())]),
            BTreeMap::from([(keys::NETWORK.to_string(), "some-other-network".to_string())]),
        ];
        for state in states {
            cloud.clear_calls();
            context(&cloud, config(&config_yaml), state)
                .delete()
                .await
                .unwrap();
            assert_eq!(
                count(&cloud.mutating_calls(), "delete_network"),
                0,
                "{}",
                cloud.name()
            );
        }

        cloud
            .providers()
            .network
            .get_network(&network.id)
            .await
            .unwrap();
        // the owned subnet inside the pinned network is gone
        let subnet_id = created.status.subnet.unwrap().id;
        assert!(cloud
            .providers()
            .network
            .get_subnet(&subnet_id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}

#[tokio::test]
async fn test_pinned_topology_survives_delete() {
    for cloud in FakeCloud::all() {
        let topology = create_topology(&cloud, "landing-zone", "10.250.0.0/16").await;
        let config_yaml = format!(
            r#"
floatingPoolName: fip-1
networks:
  id: {}
  subnetId: {}
  router:
    id: {}
  workers: 10.250.0.0/16
"#,
            topology.network_id, topology.subnet_id, topology.router_id
        );

        let created = context(&cloud, config(&config_yaml), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        cloud.clear_calls();
        let result = context(&cloud, config(&config_yaml), created.state)
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty());

        let calls = cloud.mutating_calls();
        for op in [
            "delete_network",
            "delete_subnet",
            "delete_router",
            cloud.detach_op(),
        ] {
            assert_eq!(count(&calls, op), 0, "{}: {}", cloud.name(), op);
        }
        assert_eq!(count(&calls, "delete_security_group"), 1);
        let providers = cloud.providers();
        providers.network.get_subnet(&topology.subnet_id).await.unwrap();
        providers.router.get_router(&topology.router_id).await.unwrap();
    }
}

#[tokio::test]
async fn test_shared_network_area_delete_keeps_topology() {
    for cloud in FakeCloud::all() {
        let topology = create_topology(&cloud, "sna-1", "10.250.0.0/16").await;
        let config_yaml = format!(
            r#"
floatingPoolName: fip-1
sharedNetworkArea: true
networks:
  id: {}
  workers: 10.250.0.0/16
"#,
            topology.network_id
        );

        let created = context(&cloud, config(&config_yaml), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        let ip_id = created.status.egress_public_ip_id.clone().unwrap();
        cloud.clear_calls();

        let result = context(&cloud, config(&config_yaml), created.state)
            .delete()
            .await
            .unwrap();
        assert!(result.state.is_empty(), "{}", cloud.name());
        assert!(
            result
                .report
                .skipped
                .contains(&delete::DELETE_ROUTER_INTERFACE.to_string())
        );

        let calls = cloud.mutating_calls();
        for op in [
            "delete_network",
            "delete_subnet",
            "delete_router",
            cloud.detach_op(),
        ] {
            assert_eq!(count(&calls, op), 0, "{}: {}", cloud.name(), op);
        }

        let providers = cloud.providers();
        providers.network.get_network(&topology.network_id).await.unwrap();
        providers.router.get_router(&topology.router_id).await.unwrap();
        assert!(providers
            .public_ip
            .get_public_ip(&ip_id)
            .await
            .unwrap_err()
            .is_not_found());
    }
}

#[tokio::test]
async fn test_delete_progress_reaches_state_file() {
    for cloud in FakeCloud::all() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::new(dir.path(), TECHNICAL_ID));

        let created = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        store.persist(&created.state).await.unwrap();

        let network_id = created.status.network.unwrap().id;
        cloud.add_server("worker-0", &network_id);

        let ctx = Arc::new(
            FlowContext::new(
                FlowContextOptions::new(default_config(), cluster(), cloud.providers())
                    .with_settings(fast_settings())
                    .with_state(store.load_flat_state().await.unwrap())
                    .with_persister(store.clone()),
            )
            .unwrap(),
        );
        ctx.delete().await.unwrap_err();

        // the router went away before the server check failed the run
        let persisted = store.load_flat_state().await.unwrap();
        assert!(
            persisted.get(keys::ROUTER).is_some_and(|v| v == infraflow_flow::DELETED_MARKER),
            "{}: {:?}",
            cloud.name(),
            persisted
        );
        assert_eq!(persisted.get(keys::NETWORK), Some(&network_id));
    }
}
