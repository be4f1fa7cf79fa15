//! Pipeline configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (`WORKFLOW_*`, see [`overrides::ENV_MAPPINGS`])
//! 2. Config file (`.stepflow/config.yml`)
//! 3. Embedded default, written to the config path on first load
//!
//! Config file discovery:
//! - An explicit path always wins
//! - Otherwise searches the current directory and parents for `.stepflow/config.yml`
//! - Otherwise falls back to `<project_root>/.stepflow/config.yml`

pub mod defaults;
pub mod overrides;
pub mod path;
pub mod store;
pub mod validation;

use std::path::{Path, PathBuf};

pub use overrides::{coerce_env_value, ENV_MAPPINGS};
pub use path::PathError;
pub use store::{ConfigStore, ConfigurationError};
pub use validation::ValidationResult;

/// Directory holding the config file, relative to the project root
pub const CONFIG_DIR: &str = ".stepflow";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.yml";

/// Default config location for a project
pub fn default_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Find a config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = default_config_path(&current);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Project root owning a config path (the parent of `.stepflow/`).
///
/// A bare file name such as `pipelines.yml` belongs to the current directory.
pub fn project_root_for(config_path: &Path) -> Option<PathBuf> {
    let dir = non_empty(config_path.parent()?);
    if dir.file_name().map(|n| n == CONFIG_DIR).unwrap_or(false) {
        dir.parent().map(|root| non_empty(root).to_path_buf())
    } else {
        Some(dir.to_path_buf())
    }
}

fn non_empty(dir: &Path) -> &Path {
    if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    }
}

/// Resolve the config path from an optional explicit path and a starting directory
pub fn resolve_config_path(explicit: Option<&Path>, start: &Path) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => find_config_file(start).unwrap_or_else(|| default_config_path(start)),
    }
}
