//! Whiteboard keys
//!
//! These names end up in the persisted state, changing one orphans the value
//! stored under the old name.

/// Root marker, set at the start of every reconcile
pub const RESOURCES_EXIST: &str = "ResourcesExist";

pub const FLOATING_NETWORK: &str = "FloatingNetwork";
pub const FLOATING_NETWORK_NAME: &str = "FloatingNetworkName";
pub const FLOATING_POOL_SUBNET: &str = "FloatingPoolSubnet";

pub const NETWORK: &str = "Network";
pub const NETWORK_NAME: &str = "NetworkName";

pub const SUBNET: &str = "Subnet";
pub const SUBNET_CIDR: &str = "SubnetCIDR";
/// Effective DNS nameservers of the node subnet (list)
pub const DNS_NAMESERVERS: &str = "DNSNameservers";

pub const ROUTER: &str = "Router";
pub const ROUTER_NAME: &str = "RouterName";
/// First external address of the router
pub const ROUTER_IP: &str = "RouterIP";

pub const SECURITY_GROUP: &str = "SecurityGroup";
pub const SECURITY_GROUP_NAME: &str = "SecurityGroupName";
/// Cached [`infraflow_cloud::SecurityGroup`], never persisted
pub const SECURITY_GROUP_OBJECT: &str = "SecurityGroupObject";

/// Name of the SSH keypair
pub const KEY_PAIR: &str = "KeyPair";

pub const EGRESS_PUBLIC_IP: &str = "EgressPublicIP";
/// Addresses the cluster egresses from, as host CIDRs (list)
pub const EGRESS_CIDRS: &str = "EgressCIDRs";

/// Every persisted key, removed once a delete completes
pub const ALL: &[&str] = &[
    RESOURCES_EXIST,
    FLOATING_NETWORK,
    FLOATING_NETWORK_NAME,
    FLOATING_POOL_SUBNET,
    NETWORK,
    NETWORK_NAME,
    SUBNET,
    SUBNET_CIDR,
    DNS_NAMESERVERS,
    ROUTER,
    ROUTER_NAME,
    ROUTER_IP,
    SECURITY_GROUP,
    SECURITY_GROUP_NAME,
    KEY_PAIR,
    EGRESS_PUBLIC_IP,
    EGRESS_CIDRS,
];
