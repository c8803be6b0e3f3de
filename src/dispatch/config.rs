//! Dispatcher configuration types.
//!
//! Configuration discovery order:
//! 1. The file named by `TASKCHAIN_CONFIG`
//! 2. Current directory: ./taskchain.toml
//! 3. Built-in defaults

use crate::env;
use crate::error::{Result, TaskError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which executor runs submitted callables
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchBackend {
    /// Blocking pool of a dedicated tokio runtime
    #[default]
    Tokio,
    /// One OS thread per submitted callable
    Threads,
}

/// Configuration of the shared dispatcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub backend: DispatchBackend,

    /// Async worker threads of the owned runtime
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Upper bound of the runtime's blocking pool, where callables run
    #[serde(default = "default_max_blocking_threads")]
    pub max_blocking_threads: usize,

    /// Prefix for worker thread names
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_max_blocking_threads() -> usize {
    512
}

fn default_thread_name() -> String {
    env::DEFAULT_THREAD_NAME.to_string()
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            backend: DispatchBackend::default(),
            worker_threads: default_worker_threads(),
            max_blocking_threads: default_max_blocking_threads(),
            thread_name: default_thread_name(),
        }
    }
}

impl DispatcherConfig {
    /// Use one OS thread per callable instead of a tokio runtime
    pub fn with_threads(mut self) -> Self {
        self.backend = DispatchBackend::Threads;
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_max_blocking_threads(mut self, max_blocking_threads: usize) -> Self {
        self.max_blocking_threads = max_blocking_threads;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Reject values the runtime builder would panic on
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(TaskError::InvalidConfig(
                "worker_threads must be greater than 0".to_string(),
            ));
        }
        if self.max_blocking_threads == 0 {
            return Err(TaskError::InvalidConfig(
                "max_blocking_threads must be greater than 0".to_string(),
            ));
        }
        if self.thread_name.trim().is_empty() {
            return Err(TaskError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DispatcherConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Discover configuration from the environment and current directory
    pub fn discover() -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        Self::discover_from(env::config_path_override(), &current_dir)
    }

    /// Discover configuration with an explicit override path and directory.
    ///
    /// An override that does not exist is an error; a missing local file
    /// falls back to defaults.
    pub fn discover_from(override_path: Option<PathBuf>, dir: &Path) -> Result<Self> {
        if let Some(path) = override_path {
            if !path.is_file() {
                return Err(TaskError::ConfigNotFound { path });
            }
            info!("Loading dispatcher configuration from: {:?}", path);
            return Self::from_toml_file(path);
        }

        let local = env::local_config_file_path(dir);
        debug!("Checking for config file: {:?}", local);
        if local.is_file() {
            info!("Loading dispatcher configuration from: {:?}", local);
            return Self::from_toml_file(local);
        }

        debug!("No dispatcher configuration found, using defaults");
        Ok(Self::default())
    }
}
