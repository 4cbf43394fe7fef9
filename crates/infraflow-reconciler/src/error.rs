//! Reconciler error types

use infraflow_cloud::ErrorClass;
use infraflow_flow::{FlowError, GraphError, TaskError};
use std::path::PathBuf;
use thiserror::Error;

/// Invalid or unreadable configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: String, value: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure of a reconcile or delete run
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl ReconcileError {
    /// Classify the failure for whoever schedules the next attempt.
    ///
    /// With several failed tasks the most severe class wins: configuration,
    /// then dependency, then terminal, then transient.
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::Config(_) => ErrorClass::Configuration,
            ReconcileError::Graph(_) => ErrorClass::Terminal,
            ReconcileError::Flow(err) => err
                .causes()
                .map(|failure| task_error_class(&failure.error))
                .max_by_key(|class| severity(*class))
                .unwrap_or(ErrorClass::Transient),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

fn task_error_class(error: &TaskError) -> ErrorClass {
    match error {
        TaskError::Failed(e) => ErrorClass::of_any(e),
        TaskError::Timeout(_) | TaskError::Canceled => ErrorClass::Transient,
        TaskError::Panicked(_) => ErrorClass::Terminal,
    }
}

fn severity(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::Transient => 0,
        ErrorClass::Terminal => 1,
        ErrorClass::Dependency => 2,
        ErrorClass::Configuration => 3,
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
