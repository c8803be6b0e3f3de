//! Environment constants and path utilities.
//!
//! Centralizes the file and variable names used for configuration
//! discovery.

use std::path::{Path, PathBuf};

/// Configuration file looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "taskchain.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "TASKCHAIN_CONFIG";

/// Prefix for dispatcher worker thread names
pub const DEFAULT_THREAD_NAME: &str = "taskchain-worker";

/// Status code of a successful [`TaskResult`](crate::task::TaskResult)
pub const SUCCESS_CODE: i64 = 200;

/// Build the local configuration file path from a directory
pub fn local_config_file_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Read the configuration path override from the environment
pub fn config_path_override() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
