//! IaaS API error types

use infraflow_cloud::{CloudError, ErrorReason};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_IP_GENERATION_CONFLICT: &str = "conflict.ip-generation";
pub const CODE_PUBLIC_IP_POOL_EXHAUSTED: &str = "public-ip.pool-exhausted";

/// Error body returned by every endpoint: `{"code": "...", "msg": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

#[derive(Error, Debug, Clone)]
pub enum IaasError {
    #[error("HTTP {status} {}: {}", .body.code, .body.msg)]
    Api { status: u16, body: ErrorBody },

    #[error("transport: {0}")]
    Transport(String),
}

impl IaasError {
    pub fn api(status: u16, code: impl Into<String>, msg: impl Into<String>) -> Self {
        IaasError::Api {
            status,
            body: ErrorBody {
                code: code.into(),
                msg: msg.into(),
            },
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        Self::api(404, "not-found", format!("{} {} not found", resource, id))
    }

    pub fn conflict(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::api(409, code, msg)
    }
}

impl From<IaasError> for CloudError {
    fn from(err: IaasError) -> Self {
        match err {
            IaasError::Api { status: 404, body } => CloudError::api(404, body.msg),
            IaasError::Api { status, body } => {
                let reason = match body.code.as_str() {
                    CODE_IP_GENERATION_CONFLICT => ErrorReason::IpAddressGenerationFailure,
                    CODE_PUBLIC_IP_POOL_EXHAUSTED => ErrorReason::ExternalIpPoolExhausted,
                    _ => ErrorReason::Other(body.code),
                };
                CloudError::api_with_reason(status, reason, body.msg)
            }
            IaasError::Transport(msg) => CloudError::Transport(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, IaasError>;

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_cloud::is_retryable;

    #[test]
    fn test_error_body_mapping() {
        let err: CloudError = IaasError::conflict(CODE_IP_GENERATION_CONFLICT, "race").into();
        assert_eq!(err.reason(), Some(&ErrorReason::IpAddressGenerationFailure));
        assert!(is_retryable(&err));

        let err: CloudError =
            IaasError::api(400, CODE_PUBLIC_IP_POOL_EXHAUSTED, "no addresses left").into();
        assert!(is_retryable(&err));

        let err: CloudError = IaasError::conflict("network.in-use", "in use").into();
        assert!(!is_retryable(&err));

        let err: CloudError = IaasError::not_found("network", "n-1").into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_body_deserializes() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"code":"conflict.ip-generation","msg":"retry"}"#).unwrap();
        assert_eq!(body.code, CODE_IP_GENERATION_CONFLICT);
    }
}
