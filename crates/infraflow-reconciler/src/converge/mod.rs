//! Convergence functions
//!
//! One module per resource type. Every `ensure_*` looks the resource up by
//! its known ID (falling back to its name), updates what differs and creates
//! what is missing. Every `delete_*` treats an absent resource as deleted and
//! reports whether it removed anything.

pub mod keypair;
pub mod network;
pub mod public_ip;
pub mod router;
pub mod rules;
pub mod secgroup;
pub mod sna;
pub mod subnet;

use infraflow_cloud::{CloudError, ResourceKind, Result};
use ipnet::IpNet;
use std::net::IpAddr;

/// Single-address CIDR of an IP (`/32` or `/128`)
pub fn host_cidr(ip: &str) -> Option<String> {
    ip.parse::<IpAddr>()
        .ok()
        .map(|addr| IpNet::from(addr).to_string())
}

/// A configured resource ID that does not exist is a configuration error
pub(crate) fn require_pinned<T>(kind: ResourceKind, id: &str, result: Result<T>) -> Result<T> {
    match result {
        Err(e) if e.is_not_found() => Err(CloudError::InvalidConfig(format!(
            "configured {} {} does not exist",
            kind, id
        ))),
        other => other,
    }
}
