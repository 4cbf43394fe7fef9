//! Infrastructure status derived from the whiteboard

use crate::keys;
use infraflow_flow::Whiteboard;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_pool: Option<FloatingPoolStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubnetStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group: Option<SecurityGroupStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,

    #[serde(default)]
    pub egress_cidrs: Vec<String>,

    /// Only set in shared network area mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_public_ip_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStatus {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingPoolStatus {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetStatus {
    pub id: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub dns_nameservers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupStatus {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl InfrastructureStatus {
    pub fn from_whiteboard(board: &Whiteboard) -> Self {
        let value = |key: &str| board.get_non_empty(key);
        let name = |key: &str| value(key).unwrap_or_default();

        Self {
            network: value(keys::NETWORK).map(|id| NetworkStatus {
                id,
                name: name(keys::NETWORK_NAME),
            }),
            router: value(keys::ROUTER).map(|id| RouterStatus {
                id,
                external_ip: value(keys::ROUTER_IP),
            }),
            floating_pool: value(keys::FLOATING_NETWORK).map(|id| FloatingPoolStatus {
                id,
                name: name(keys::FLOATING_NETWORK_NAME),
                subnet_id: value(keys::FLOATING_POOL_SUBNET),
            }),
            subnet: value(keys::SUBNET).map(|id| SubnetStatus {
                id,
                cidr: name(keys::SUBNET_CIDR),
                dns_nameservers: board.get_list(keys::DNS_NAMESERVERS).unwrap_or_default(),
            }),
            security_group: value(keys::SECURITY_GROUP).map(|id| SecurityGroupStatus {
                id,
                name: name(keys::SECURITY_GROUP_NAME),
            }),
            key_name: value(keys::KEY_PAIR),
            egress_cidrs: board.get_list(keys::EGRESS_CIDRS).unwrap_or_default(),
            egress_public_ip_id: value(keys::EGRESS_PUBLIC_IP),
        }
    }

    /// Status of persisted state, as written by a previous run
    pub fn from_flat_state(state: &BTreeMap<String, String>) -> Self {
        Self::from_whiteboard(&Whiteboard::from_flat_map(state))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
