//! Runtime settings of the flows
//!
//! Defaults can be overridden with environment variables:
//!
//! | variable | setting |
//! |---|---|
//! | `INFRAFLOW_TASK_TIMEOUT_SECS` | timeout of ordinary tasks |
//! | `INFRAFLOW_LONG_TASK_TIMEOUT_SECS` | timeout of router, interface and public IP tasks |
//! | `INFRAFLOW_RETRY_MAX_ATTEMPTS` | attempts of retried provider calls |
//! | `INFRAFLOW_RETRY_INITIAL_DELAY_MS` | first retry delay |
//! | `INFRAFLOW_RETRY_MAX_DELAY_MS` | retry delay cap |
//! | `INFRAFLOW_PERSIST_INTERVAL_SECS` | minimum time between intermediate state writes |

use crate::error::ConfigError;
use infraflow_cloud::RetryConfig;
use std::str::FromStr;
use std::time::Duration;

const ENV_TASK_TIMEOUT: &str = "INFRAFLOW_TASK_TIMEOUT_SECS";
const ENV_LONG_TASK_TIMEOUT: &str = "INFRAFLOW_LONG_TASK_TIMEOUT_SECS";
const ENV_RETRY_MAX_ATTEMPTS: &str = "INFRAFLOW_RETRY_MAX_ATTEMPTS";
const ENV_RETRY_INITIAL_DELAY: &str = "INFRAFLOW_RETRY_INITIAL_DELAY_MS";
const ENV_RETRY_MAX_DELAY: &str = "INFRAFLOW_RETRY_MAX_DELAY_MS";
const ENV_PERSIST_INTERVAL: &str = "INFRAFLOW_PERSIST_INTERVAL_SECS";

#[derive(Debug, Clone)]
pub struct Settings {
    pub task_timeout: Duration,
    pub long_task_timeout: Duration,
    /// Retry policy of create/attach calls
    pub retry: RetryConfig,
    /// Intermediate persists closer together than this are skipped
    pub persist_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(90),
            long_task_timeout: Duration::from_secs(180),
            retry: RetryConfig::default(),
            persist_interval: Duration::from_secs(10),
        }
    }
}

impl Settings {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(secs) = env_value::<u64>(ENV_TASK_TIMEOUT)? {
            self.task_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_value::<u64>(ENV_LONG_TASK_TIMEOUT)? {
            self.long_task_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_value::<u32>(ENV_RETRY_MAX_ATTEMPTS)? {
            self.retry.max_attempts = attempts;
        }
        if let Some(ms) = env_value::<u64>(ENV_RETRY_INITIAL_DELAY)? {
            self.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>(ENV_RETRY_MAX_DELAY)? {
            self.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_value::<u64>(ENV_PERSIST_INTERVAL)? {
            self.persist_interval = Duration::from_secs(secs);
        }
        Ok(())
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, task: Duration, long_task: Duration) -> Self {
        self.task_timeout = task;
        self.long_task_timeout = long_task;
        self
    }

    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval = interval;
        self
    }
}

fn env_value<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::Env {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_vars_unset(
            [
                ENV_TASK_TIMEOUT,
                ENV_LONG_TASK_TIMEOUT,
                ENV_RETRY_MAX_ATTEMPTS,
                ENV_RETRY_INITIAL_DELAY,
                ENV_RETRY_MAX_DELAY,
                ENV_PERSIST_INTERVAL,
            ],
            || {
                let settings = Settings::from_env().unwrap();
                assert_eq!(settings.task_timeout, Duration::from_secs(90));
                assert_eq!(settings.long_task_timeout, Duration::from_secs(180));
                assert_eq!(settings.retry.max_attempts, 5);
                assert_eq!(settings.persist_interval, Duration::from_secs(10));
            },
        );
    }

    #[test]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                (ENV_TASK_TIMEOUT, Some("30")),
                (ENV_RETRY_MAX_ATTEMPTS, Some("2")),
                (ENV_RETRY_INITIAL_DELAY, Some("50")),
                (ENV_PERSIST_INTERVAL, Some("")),
            ],
            || {
                let settings = Settings::from_env().unwrap();
                assert_eq!(settings.task_timeout, Duration::from_secs(30));
                assert_eq!(settings.retry.max_attempts, 2);
                assert_eq!(settings.retry.initial_delay, Duration::from_millis(50));
                assert_eq!(settings.persist_interval, Duration::from_secs(10));
            },
        );
    }

    #[test]
    fn test_invalid_env_value() {
        temp_env::with_var(ENV_LONG_TASK_TIMEOUT, Some("soon"), || {
            let err = Settings::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Env { ref var, .. } if var == ENV_LONG_TASK_TIMEOUT));
        });
    }
}
