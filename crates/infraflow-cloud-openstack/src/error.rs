//! OpenStack error types

use infraflow_cloud::{CloudError, ErrorReason, ResourceKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Neutron fault body, e.g. `{"type": "IpAddressGenerationFailure", "message": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutronFault {
    #[serde(rename = "type")]
    pub fault_type: String,
    pub message: String,
}

impl NeutronFault {
    pub fn new(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fault_type: fault_type.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum OpenStackError {
    #[error("{resource} {id} could not be found")]
    NotFound { resource: &'static str, id: String },

    #[error("HTTP {status}: {}", .fault.message)]
    Http { status: u16, fault: NeutronFault },

    #[error("connection failed: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),
}

impl OpenStackError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        OpenStackError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn conflict(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        OpenStackError::Http {
            status: 409,
            fault: NeutronFault::new(fault_type, message),
        }
    }

    pub fn bad_request(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        OpenStackError::Http {
            status: 400,
            fault: NeutronFault::new(fault_type, message),
        }
    }
}

fn resource_kind(resource: &str) -> ResourceKind {
    match resource {
        "network" => ResourceKind::Network,
        "subnet" => ResourceKind::Subnet,
        "router" => ResourceKind::Router,
        "port" => ResourceKind::RouterInterface,
        "security_group" => ResourceKind::SecurityGroup,
        "security_group_rule" => ResourceKind::SecurityGroupRule,
        "keypair" => ResourceKind::Keypair,
        "floatingip" => ResourceKind::PublicIp,
        _ => ResourceKind::Server,
    }
}

fn error_reason(fault_type: &str) -> ErrorReason {
    match fault_type {
        "IpAddressGenerationFailure" => ErrorReason::IpAddressGenerationFailure,
        "ExternalIpAddressExhausted" => ErrorReason::ExternalIpPoolExhausted,
        other => ErrorReason::Other(other.to_string()),
    }
}

impl From<OpenStackError> for CloudError {
    fn from(err: OpenStackError) -> Self {
        match err {
            OpenStackError::NotFound { resource, id } => {
                CloudError::not_found(resource_kind(resource), id)
            }
            OpenStackError::Http { status: 404, fault } => CloudError::api(404, fault.message),
            OpenStackError::Http { status, fault } => {
                CloudError::api_with_reason(status, error_reason(&fault.fault_type), fault.message)
            }
            OpenStackError::Transport(msg) => CloudError::Transport(msg),
            OpenStackError::Timeout(msg) => CloudError::Timeout(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, OpenStackError>;
