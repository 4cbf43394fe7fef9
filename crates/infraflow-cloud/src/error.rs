//! Cloud provider error types

use std::fmt;
use thiserror::Error;

/// Kind of provider resource, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Network,
    Subnet,
    Router,
    RouterInterface,
    SecurityGroup,
    SecurityGroupRule,
    Keypair,
    PublicIp,
    Server,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Subnet => write!(f, "subnet"),
            ResourceKind::Router => write!(f, "router"),
            ResourceKind::RouterInterface => write!(f, "router interface"),
            ResourceKind::SecurityGroup => write!(f, "security group"),
            ResourceKind::SecurityGroupRule => write!(f, "security group rule"),
            ResourceKind::Keypair => write!(f, "keypair"),
            ResourceKind::PublicIp => write!(f, "public ip"),
            ResourceKind::Server => write!(f, "server"),
        }
    }
}

/// Structured reason extracted from a provider error body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorReason {
    /// The provider lost a race while allocating a fixed IP address
    IpAddressGenerationFailure,
    /// The external address pool is (temporarily) exhausted
    ExternalIpPoolExhausted,
    /// Any other provider-specific code
    Other(String),
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorReason::IpAddressGenerationFailure => write!(f, "IpAddressGenerationFailure"),
            ErrorReason::ExternalIpPoolExhausted => write!(f, "ExternalIpPoolExhausted"),
            ErrorReason::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("API error (HTTP {status}{}): {message}", reason_suffix(.reason))]
    Api {
        status: u16,
        reason: Option<ErrorReason>,
        message: String,
    },

    #[error("found {count} {kind}s named {name:?}, expected at most one")]
    MultipleMatches {
        kind: ResourceKind,
        name: String,
        count: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Infrastructure dependency: {0}")]
    Dependency(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("State file error: {0}")]
    State(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn reason_suffix(reason: &Option<ErrorReason>) -> String {
    reason
        .as_ref()
        .map(|r| format!(", {}", r))
        .unwrap_or_default()
}

impl CloudError {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        CloudError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        CloudError::Api {
            status,
            reason: None,
            message: message.into(),
        }
    }

    pub fn api_with_reason(status: u16, reason: ErrorReason, message: impl Into<String>) -> Self {
        CloudError::Api {
            status,
            reason: Some(reason),
            message: message.into(),
        }
    }

    /// HTTP status of the failed call, if known
    pub fn status(&self) -> Option<u16> {
        match self {
            CloudError::NotFound { .. } => Some(404),
            CloudError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&ErrorReason> {
        match self {
            CloudError::Api { reason, .. } => reason.as_ref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Turn a NotFound error into `Ok(None)`
pub fn ignore_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
