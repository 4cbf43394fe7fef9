//! Security group rule reconciliation
//!
//! Live rules are matched structurally against the desired set. A match
//! stamps the live rule ID onto the desired entry; desired entries without
//! an ID afterwards are created. Live rules without a match are only deleted
//! when the caller's policy allows it.

use infraflow_cloud::{
    Direction, EtherType, Result, SecurityGroup, SecurityGroupProvider, SecurityGroupRule,
    ignore_not_found,
};

const NODE_PORT_MIN: u16 = 30000;
const NODE_PORT_MAX: u16 = 32767;
const ANYWHERE_V4: &str = "0.0.0.0/0";

/// Rules every cluster security group carries
pub fn desired_rules(
    group_id: &str,
    workers_cidr: &str,
    pods_cidr: Option<&str>,
) -> Vec<SecurityGroupRule> {
    let mut rules = vec![
        SecurityGroupRule::new(Direction::Ingress, EtherType::IPv4)
            .remote_group(group_id)
            .description("IPv4: allow all incoming traffic within the same security group"),
        SecurityGroupRule::new(Direction::Egress, EtherType::IPv4)
            .description("IPv4: allow all outgoing traffic"),
        SecurityGroupRule::new(Direction::Egress, EtherType::IPv6)
            .description("IPv6: allow all outgoing traffic"),
        SecurityGroupRule::new(Direction::Ingress, EtherType::IPv4)
            .protocol("tcp")
            .ports(NODE_PORT_MIN, NODE_PORT_MAX)
            .remote_ip_prefix(ANYWHERE_V4)
            .description("IPv4: allow all incoming tcp traffic with port range 30000-32767"),
        SecurityGroupRule::new(Direction::Ingress, EtherType::IPv4)
            .protocol("udp")
            .ports(NODE_PORT_MIN, NODE_PORT_MAX)
            .remote_ip_prefix(ANYWHERE_V4)
            .description("IPv4: allow all incoming udp traffic with port range 30000-32767"),
        SecurityGroupRule::new(Direction::Ingress, EtherType::IPv4)
            .remote_ip_prefix(workers_cidr)
            .description("IPv4: allow all incoming traffic from the node network"),
    ];

    if let Some(pods) = pods_cidr {
        rules.push(
            SecurityGroupRule::new(Direction::Ingress, EtherType::IPv4)
                .remote_ip_prefix(pods)
                .description("IPv4: allow all incoming traffic from the pod network"),
        );
    }

    for rule in &mut rules {
        rule.security_group_id = group_id.to_string();
    }
    rules
}

/// Default policy: unwanted rules are left alone
pub fn keep_unwanted(_rule: &SecurityGroupRule) -> bool {
    false
}

/// Bring the rules of `group` in line with `desired`.
///
/// Desired entries get the ID of their live counterpart or of the rule
/// created for them. Returns whether anything was created or deleted.
pub async fn reconcile_rules<F>(
    provider: &dyn SecurityGroupProvider,
    group: &SecurityGroup,
    desired: &mut [SecurityGroupRule],
    allow_delete: F,
) -> Result<bool>
where
    F: Fn(&SecurityGroupRule) -> bool,
{
    for rule in desired.iter_mut() {
        rule.id.clear();
        rule.security_group_id = group.id.clone();
    }

    let mut modified = false;
    for live in &group.rules {
        let matched = desired
            .iter_mut()
            .find(|wanted| wanted.id.is_empty() && wanted.matches(live));
        match matched {
            Some(wanted) => wanted.id = live.id.clone(),
            None if allow_delete(live) => {
                tracing::info!("Deleting unwanted rule {} ({}) of {}", live.id, live, group.id);
                ignore_not_found(provider.delete_rule(live).await)?;
                modified = true;
            }
            None => {
                tracing::debug!("Keeping unwanted rule {} ({}) of {}", live.id, live, group.id);
            }
        }
    }

    for wanted in desired.iter_mut().filter(|r| r.id.is_empty()) {
        tracing::info!("Creating rule ({}) in {}", wanted, group.id);
        let created = provider.create_rule(wanted).await?;
        wanted.id = created.id;
        wanted.created_at = created.created_at;
        wanted.updated_at = created.updated_at;
        modified = true;
    }

    Ok(modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_cloud_openstack::{InMemoryOpenStack, OpenStackProvider};
    use std::sync::Arc;

    async fn setup() -> (Arc<InMemoryOpenStack>, OpenStackProvider, SecurityGroup) {
        let api = Arc::new(InMemoryOpenStack::new());
        let provider = OpenStackProvider::new(api.clone());
        let group = provider.create_security_group("shoot", "").await.unwrap();
        (api, provider, group)
    }

    #[test]
    fn test_desired_rules() {
        let rules = desired_rules("sg-1", "10.250.0.0/16", None);
        assert_eq!(rules.len(), 6);
        assert!(rules.iter().all(|r| r.security_group_id == "sg-1"));
        assert_eq!(rules[0].remote_group_id.as_deref(), Some("sg-1"));

        let with_pods = desired_rules("sg-1", "10.250.0.0/16", Some("100.96.0.0/11"));
        assert_eq!(with_pods.len(), 7);
        assert_eq!(
            with_pods[6].remote_ip_prefix.as_deref(),
            Some("100.96.0.0/11")
        );
    }

    #[tokio::test]
    async fn test_reconcile_creates_missing_rules_only() {
        let (api, provider, group) = setup().await;
        // new groups come with both default egress rules
        assert_eq!(group.rules.len(), 2);

        let mut desired = desired_rules(&group.id, "10.250.0.0/16", None);
        let modified = reconcile_rules(&provider, &group, &mut desired, keep_unwanted)
            .await
            .unwrap();
        assert!(modified);
        assert!(desired.iter().all(|r| !r.id.is_empty()));
        assert_eq!(
            api.calls()
                .iter()
                .filter(|c| c.starts_with("create_security_group_rule"))
                .count(),
            4
        );

        let group = provider.get_security_group(&group.id).await.unwrap();
        assert_eq!(group.rules.len(), 6);

        let mut again = desired_rules(&group.id, "10.250.0.0/16", None);
        let modified = reconcile_rules(&provider, &group, &mut again, keep_unwanted)
            .await
            .unwrap();
        assert!(!modified);
        let mut ids: Vec<_> = again.iter().map(|r| r.id.clone()).collect();
        let mut expected: Vec<_> = desired.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_unwanted_rules_follow_policy() {
        let (_api, provider, group) = setup().await;
        let mut desired = desired_rules(&group.id, "10.250.0.0/16", None);
        reconcile_rules(&provider, &group, &mut desired, keep_unwanted)
            .await
            .unwrap();

        let mut extra = SecurityGroupRule::new(Direction::Ingress, EtherType::IPv4)
            .protocol("tcp")
            .ports(22, 22)
            .remote_ip_prefix("0.0.0.0/0");
        extra.security_group_id = group.id.clone();
        provider.create_rule(&extra).await.unwrap();

        let group = provider.get_security_group(&group.id).await.unwrap();
        let mut desired = desired_rules(&group.id, "10.250.0.0/16", None);
        let modified = reconcile_rules(&provider, &group, &mut desired, keep_unwanted)
            .await
            .unwrap();
        assert!(!modified);
        assert_eq!(
            provider.get_security_group(&group.id).await.unwrap().rules.len(),
            7
        );

        let modified = reconcile_rules(&provider, &group, &mut desired, |r| {
            r.port_range_min == Some(22)
        })
        .await
        .unwrap();
        assert!(modified);
        let rules = provider.get_security_group(&group.id).await.unwrap().rules;
        assert_eq!(rules.len(), 6);
        assert!(rules.iter().all(|r| r.port_range_min != Some(22)));
    }

    #[tokio::test]
    async fn test_changed_workers_cidr_adds_rule() {
        let (_api, provider, group) = setup().await;
        let mut desired = desired_rules(&group.id, "10.250.0.0/16", None);
        reconcile_rules(&provider, &group, &mut desired, keep_unwanted)
            .await
            .unwrap();

        let group = provider.get_security_group(&group.id).await.unwrap();
        let mut desired = desired_rules(&group.id, "10.251.0.0/16", None);
        let modified = reconcile_rules(&provider, &group, &mut desired, keep_unwanted)
            .await
            .unwrap();
        assert!(modified);
        // the rule for the old CIDR is kept under the default policy
        assert_eq!(
            provider.get_security_group(&group.id).await.unwrap().rules.len(),
            7
        );
    }
}
