//! Error types for task construction and dispatcher setup.
//!
//! Task outcomes are not errors: a failed unit reports a
//! [`TaskState::Failed`](crate::task::TaskState::Failed) value. `TaskError`
//! covers API misuse and configuration problems only.

use std::path::PathBuf;

/// Errors raised while building executors or configuring dispatch
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Units can only be added to an aggregate that has not started
    #[error("cannot add task: aggregate is {state}")]
    NotIdle { state: &'static str },

    /// Units can only be added to aggregate-backed chain nodes
    #[error("cannot add task to a single-task node")]
    NotAggregate,

    /// The process-wide dispatcher was already initialized
    #[error("shared dispatcher is already installed")]
    AlreadyInstalled,

    /// No tokio runtime to borrow a handle from
    #[error("no tokio runtime is running: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration file '{}' not found", .path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;
