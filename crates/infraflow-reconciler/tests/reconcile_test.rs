mod common;

use common::*;
use infraflow_cloud::{CloudError, ErrorClass, FileStateStore, NetworkSpec, SecurityGroupRule};
use infraflow_cloud::{Direction, EtherType};
use infraflow_reconciler::{FlowContext, FlowContextOptions, ReconcileError, keys, reconcile};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn test_reconcile_workers_network_from_scratch() {
    for cloud in FakeCloud::all() {
        let ctx = context(&cloud, default_config(), BTreeMap::new());
        let result = ctx.reconcile().await.unwrap();
        let status = &result.status;

        let network = status.network.as_ref().expect("network");
        assert!(!network.id.is_empty(), "{}", cloud.name());
        assert_eq!(network.name, TECHNICAL_ID);

        let subnet = status.subnet.as_ref().expect("subnet");
        assert!(!subnet.id.is_empty());
        assert_eq!(subnet.cidr, "10.250.0.0/16");
        assert_eq!(subnet.dns_nameservers, vec!["8.8.8.8"]);

        let router = status.router.as_ref().expect("router");
        assert!(!router.id.is_empty());
        assert_eq!(router.external_ip.as_deref(), Some(cloud.first_external_ip()));
        assert_eq!(
            status.egress_cidrs,
            vec![format!("{}/32", cloud.first_external_ip())]
        );

        assert_eq!(status.floating_pool.as_ref().unwrap().name, FLOATING_POOL);
        assert_eq!(status.key_name.as_deref(), Some(TECHNICAL_ID));
        assert!(status.egress_public_ip_id.is_none());

        let group = status.security_group.as_ref().expect("security group");
        let live = cloud
            .providers()
            .security_group
            .get_security_group(&group.id)
            .await
            .unwrap();
        // six base rules plus the pod network
        assert_eq!(live.rules.len(), 7, "{}", cloud.name());

        assert_eq!(
            result.report.skipped,
            vec![
                reconcile::DISCOVER_SHARED_NETWORK_AREA,
                reconcile::ENSURE_EGRESS_PUBLIC_IP
            ]
        );
        assert_eq!(result.state.get(keys::RESOURCES_EXIST).map(String::as_str), Some("true"));
    }
}

#[tokio::test]
async fn test_padded_technical_id_names_resources() {
    for cloud in FakeCloud::all() {
        let mut padded = cluster();
        padded.technical_id = format!("  {}\n", TECHNICAL_ID);

        let result = context_with(&cloud, default_config(), padded, BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        assert_eq!(result.status.network.unwrap().name, TECHNICAL_ID, "{}", cloud.name());
        assert_eq!(result.status.security_group.unwrap().name, TECHNICAL_ID);
        assert_eq!(result.status.key_name.as_deref(), Some(TECHNICAL_ID));
        assert_eq!(
            cloud
                .providers()
                .router
                .list_routers_by_name(TECHNICAL_ID)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    for cloud in FakeCloud::all() {
        let first = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        cloud.clear_calls();

        let second = context(&cloud, default_config(), first.state.clone())
            .reconcile()
            .await
            .unwrap();

        assert!(
            cloud.mutating_calls().is_empty(),
            "{}: {:#?}",
            cloud.name(),
            cloud.mutating_calls()
        );
        assert_eq!(second.status, first.status);
        assert_eq!(second.state, first.state);
    }
}

#[tokio::test]
async fn test_reconcile_completes_partial_state() {
    for cloud in FakeCloud::all() {
        let network = cloud
            .providers()
            .network
            .create_network(&NetworkSpec {
                name: TECHNICAL_ID.to_string(),
                admin_state_up: true,
            })
            .await
            .unwrap();
        cloud.clear_calls();

        let state = BTreeMap::from([(keys::NETWORK.to_string(), network.id.clone())]);
        let result = context(&cloud, default_config(), state)
            .reconcile()
            .await
            .unwrap();

        let calls = cloud.mutating_calls();
        assert_eq!(count(&calls, "create_network"), 0, "{}", cloud.name());
        assert_eq!(count(&calls, "create_subnet"), 1);
        assert_eq!(count(&calls, "create_router"), 1);
        assert_eq!(count(&calls, "create_security_group"), 1);
        assert_eq!(count(&calls, "create_keypair"), 1);
        assert_eq!(result.status.network.unwrap().id, network.id);
    }
}

#[tokio::test]
async fn test_failed_run_keeps_progress() {
    for cloud in FakeCloud::all() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::new(dir.path(), TECHNICAL_ID));
        cloud.fail_next("create_security_group");

        let ctx = Arc::new(
            FlowContext::new(
                FlowContextOptions::new(default_config(), cluster(), cloud.providers())
                    .with_settings(fast_settings())
                    .with_persister(store.clone()),
            )
            .unwrap(),
        );
        let err = ctx.reconcile().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Terminal, "{}", cloud.name());
        assert!(!err.is_retryable());
        let ReconcileError::Flow(flow) = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(flow.failure_of(reconcile::ENSURE_SECURITY_GROUP).is_some());
        assert!(
            flow.not_run
                .contains(&reconcile::ENSURE_SECURITY_GROUP_RULES.to_string())
        );

        // everything independent of the security group was created and persisted
        let persisted = store.load_flat_state().await.unwrap();
        for key in [keys::NETWORK, keys::SUBNET, keys::ROUTER, keys::KEY_PAIR] {
            assert!(persisted.contains_key(key), "{}: {} missing", cloud.name(), key);
        }
        assert!(!persisted.contains_key(keys::SECURITY_GROUP));

        cloud.clear_calls();
        let result = context(&cloud, default_config(), persisted)
            .reconcile()
            .await
            .unwrap();
        let calls = cloud.mutating_calls();
        assert_eq!(count(&calls, "create_network"), 0);
        assert_eq!(count(&calls, "create_subnet"), 0);
        assert_eq!(count(&calls, "create_router"), 0);
        assert_eq!(count(&calls, "create_security_group"), 1);
        assert!(result.status.security_group.is_some());
    }
}

#[tokio::test]
async fn test_ambiguous_network_name_is_not_guessed() {
    for cloud in FakeCloud::all() {
        let providers = cloud.providers();
        for _ in 0..2 {
            providers
                .network
                .create_network(&NetworkSpec {
                    name: TECHNICAL_ID.to_string(),
                    admin_state_up: true,
                })
                .await
                .unwrap();
        }
        cloud.clear_calls();

        let err = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration, "{}", cloud.name());
        let ReconcileError::Flow(flow) = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(matches!(
            flow.find_cause::<CloudError>(),
            Some(CloudError::MultipleMatches { count: 2, .. })
        ));

        let calls = cloud.mutating_calls();
        assert_eq!(count(&calls, "create_network"), 0);
        assert_eq!(count(&calls, "create_subnet"), 0);
    }
}

#[tokio::test]
async fn test_unknown_floating_pool_is_configuration_error() {
    for cloud in FakeCloud::all() {
        let config = config(
            r#"
floatingPoolName: does-not-exist
networks:
  workers: 10.250.0.0/16
"#,
        );
        let err = context(&cloud, config, BTreeMap::new())
            .reconcile()
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration, "{}", cloud.name());
        assert_eq!(count(&cloud.mutating_calls(), "create_router"), 0);
    }
}

#[tokio::test]
async fn test_pinned_network_and_router_are_only_read() {
    for cloud in FakeCloud::all() {
        let topology = create_topology(&cloud, "shared-infra", "10.250.0.0/16").await;
        cloud.clear_calls();

        let config = config(&format!(
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
        ));
        let result = context(&cloud, config, BTreeMap::new())
            .reconcile()
            .await
            .unwrap();

        let calls = cloud.mutating_calls();
        for op in ["create_network", "create_subnet", "create_router"] {
            assert_eq!(count(&calls, op), 0, "{}: {}", cloud.name(), op);
        }
        assert!(calls.iter().all(|c| !c.starts_with("update_") && !c.starts_with("patch_")));
        assert_eq!(result.status.network.unwrap().id, topology.network_id);
        assert_eq!(result.status.subnet.unwrap().id, topology.subnet_id);
        assert_eq!(result.status.router.unwrap().id, topology.router_id);
    }
}

#[tokio::test]
async fn test_missing_pinned_network_is_configuration_error() {
    for cloud in FakeCloud::all() {
        let config = config(
            r#"
floatingPoolName: fip-1
networks:
  id: net-does-not-exist
  workers: 10.250.0.0/16
"#,
        );
        let err = context(&cloud, config, BTreeMap::new())
            .reconcile()
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration, "{}", cloud.name());
    }
}

#[tokio::test]
async fn test_unwanted_rules_are_kept() {
    for cloud in FakeCloud::all() {
        let first = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        let group_id = first.status.security_group.unwrap().id;

        let providers = cloud.providers();
        let mut ssh = SecurityGroupRule::new(Direction::Ingress, EtherType::IPv4)
            .protocol("tcp")
            .ports(22, 22)
            .remote_ip_prefix("0.0.0.0/0");
        ssh.security_group_id = group_id.clone();
        providers.security_group.create_rule(&ssh).await.unwrap();
        cloud.clear_calls();

        context(&cloud, default_config(), first.state)
            .reconcile()
            .await
            .unwrap();

        let calls = cloud.mutating_calls();
        assert!(calls.is_empty(), "{}: {:#?}", cloud.name(), calls);
        let live = providers
            .security_group
            .get_security_group(&group_id)
            .await
            .unwrap();
        assert_eq!(live.rules.len(), 8);
    }
}

#[tokio::test]
async fn test_changed_ssh_key_replaces_keypair() {
    const OTHER_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIHqR7 ops@example";

    for cloud in FakeCloud::all() {
        let first = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        cloud.clear_calls();

        let rotated = cluster().with_ssh_public_key(OTHER_KEY);
        context_with(&cloud, default_config(), rotated, first.state.clone())
            .reconcile()
            .await
            .unwrap();
        let calls = cloud.mutating_calls();
        assert!(position(&calls, "delete_keypair") < position(&calls, "create_keypair"));
        let keypair = cloud
            .providers()
            .keypair
            .get_keypair(TECHNICAL_ID)
            .await
            .unwrap();
        assert_eq!(keypair.public_key, OTHER_KEY);

        let mut without_key = cluster();
        without_key.ssh_public_key = None;
        let result = context_with(&cloud, default_config(), without_key, first.state)
            .reconcile()
            .await
            .unwrap();
        assert!(result.status.key_name.is_none(), "{}", cloud.name());
        let err = cloud
            .providers()
            .keypair
            .get_keypair(TECHNICAL_ID)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

#[tokio::test]
async fn test_dns_override_updates_subnet() {
    for cloud in FakeCloud::all() {
        let first = context(&cloud, default_config(), BTreeMap::new())
            .reconcile()
            .await
            .unwrap();

        let config = config(
            r#"
floatingPoolName: fip-1
dnsServers: ["1.1.1.1", "9.9.9.9"]
networks:
  workers: 10.250.0.0/16
"#,
        );
        let result = context(&cloud, config, first.state).reconcile().await.unwrap();
        assert_eq!(
            result.status.subnet.unwrap().dns_nameservers,
            vec!["1.1.1.1", "9.9.9.9"],
            "{}",
            cloud.name()
        );
    }
}

#[tokio::test]
async fn test_shared_network_area_uses_discovered_topology() {
    for cloud in FakeCloud::all() {
        let topology = create_topology(&cloud, "sna-1", "10.250.0.0/16").await;
        cloud.clear_calls();

        let config = config(&format!(
            r#"
floatingPoolName: fip-1
sharedNetworkArea: true
networks:
  id: {}
  workers: 10.250.0.0/16
"#,
            topology.network_id
        ));
        let result = context(&cloud, config, BTreeMap::new())
            .reconcile()
            .await
            .unwrap();
        let status = &result.status;

        assert_eq!(status.network.as_ref().unwrap().id, topology.network_id);
        assert_eq!(status.subnet.as_ref().unwrap().id, topology.subnet_id);
        assert_eq!(status.router.as_ref().unwrap().id, topology.router_id);

        let ip_id = status.egress_public_ip_id.clone().expect("egress public ip");
        let ip = cloud.providers().public_ip.get_public_ip(&ip_id).await.unwrap();
        assert_eq!(ip.name, format!("{}-egress", TECHNICAL_ID));
        assert_eq!(status.egress_cidrs, vec![format!("{}/32", ip.ip_address)]);

        let calls = cloud.mutating_calls();
        for op in ["create_network", "create_subnet", "create_router"] {
            assert_eq!(count(&calls, op), 0, "{}: {}", cloud.name(), op);
        }
        assert_eq!(count(&calls, "add_router_interface"), 0);
        assert_eq!(count(&calls, "attach_subnet"), 0);
        assert_eq!(count(&calls, "create_security_group"), 1);
        assert!(
            result
                .report
                .skipped
                .contains(&reconcile::ENSURE_ROUTER.to_string())
        );
    }
}
