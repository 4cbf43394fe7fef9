//! Retry classification and backoff
//!
//! Only a handful of provider failures are worth retrying inside a task:
//!
//! | status | retried when |
//! |---|---|
//! | 404 | always (eventual consistency right after create) |
//! | 409 | the provider lost a race allocating a fixed IP |
//! | 400 | the external address pool is momentarily exhausted |
//!
//! Everything else is returned to the caller unchanged. A conflict that is
//! not retried means something still uses the resource.

use crate::error::{CloudError, ErrorReason};
use crate::provider::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Whether a failed provider call may succeed if repeated
pub fn is_retryable(err: &CloudError) -> bool {
    match err.status() {
        Some(404) => true,
        Some(409) => matches!(err.reason(), Some(ErrorReason::IpAddressGenerationFailure)),
        Some(400) => matches!(err.reason(), Some(ErrorReason::ExternalIpPoolExhausted)),
        _ => false,
    }
}

/// Coarse class of a failure, reported to whoever schedules the next run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying later will likely succeed
    Transient,
    /// Something outside our control still uses the infrastructure
    Dependency,
    /// The desired configuration cannot be satisfied as written
    Configuration,
    /// Anything else
    Terminal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Dependency => write!(f, "dependency"),
            ErrorClass::Configuration => write!(f, "configuration"),
            ErrorClass::Terminal => write!(f, "terminal"),
        }
    }
}

impl ErrorClass {
    pub fn of(err: &CloudError) -> Self {
        match err {
            _ if is_retryable(err) => ErrorClass::Transient,
            CloudError::Timeout(_) | CloudError::Transport(_) | CloudError::Lock(_) => {
                ErrorClass::Transient
            }
            CloudError::Dependency(_) | CloudError::Api { status: 409, .. } => {
                ErrorClass::Dependency
            }
            CloudError::InvalidConfig(_) | CloudError::MultipleMatches { .. } => {
                ErrorClass::Configuration
            }
            _ => ErrorClass::Terminal,
        }
    }

    /// Class of the first `CloudError` in an error chain, `Terminal` if none
    pub fn of_any(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<CloudError>())
            .map(ErrorClass::of)
            .unwrap_or(ErrorClass::Terminal)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` is reached. Delays grow exponentially with jitter.
pub async fn retry_on_transient<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, CloudError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CloudError>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                if attempt >= config.max_attempts.max(1) {
                    error!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // 0.5x to 1.5x of the current delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis() as u64,
                    "Transient provider error, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
