//! Pre-flight environment checks.
//!
//! Run before executing pipelines to catch a stale engine, a project root
//! missing expected directories, or a configuration with nothing to run.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info};

use crate::config::ConfigStore;

/// Version of this engine
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest engine version a configuration may run on when
/// `requirements.min_version` is not set
pub const MIN_ENGINE_VERSION: &str = "0.1.0";

/// A failed pre-flight check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentIssue {
    #[error("Engine version {current} is older than required {required}")]
    VersionTooOld { current: String, required: String },

    #[error("Invalid version string: '{0}'")]
    InvalidVersion(String),

    #[error("Required directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("No workflows are defined")]
    NoWorkflows,
}

/// Checks the runtime environment before pipelines run
#[derive(Debug, Clone)]
pub struct EnvironmentValidator {
    project_root: PathBuf,
    engine_version: String,
    min_version: String,
    required_dirs: Vec<String>,
    workflow_count: usize,
}

impl EnvironmentValidator {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            engine_version: ENGINE_VERSION.to_string(),
            min_version: MIN_ENGINE_VERSION.to_string(),
            required_dirs: Vec::new(),
            workflow_count: 0,
        }
    }

    /// Take the version floor, directory list and workflow count from a store
    pub fn from_config(project_root: impl Into<PathBuf>, config: &ConfigStore) -> Self {
        let requirements = config.requirements();
        Self {
            min_version: requirements
                .min_version
                .unwrap_or_else(|| MIN_ENGINE_VERSION.to_string()),
            required_dirs: requirements.directories,
            workflow_count: config.workflow_names().len(),
            ..Self::new(project_root)
        }
    }

    pub fn with_required_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = version.into();
        self
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    pub fn with_workflow_count(mut self, count: usize) -> Self {
        self.workflow_count = count;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Run every check, stopping at the first failure
    pub fn check(&self) -> Result<(), EnvironmentIssue> {
        if version_cmp(&self.engine_version, &self.min_version)? == Ordering::Less {
            return Err(EnvironmentIssue::VersionTooOld {
                current: self.engine_version.clone(),
                required: self.min_version.clone(),
            });
        }

        for dir in &self.required_dirs {
            let path = self.project_root.join(dir);
            if !path.is_dir() {
                return Err(EnvironmentIssue::MissingDirectory(path));
            }
        }

        if self.workflow_count == 0 {
            return Err(EnvironmentIssue::NoWorkflows);
        }

        Ok(())
    }

    /// Run every check, logging the failing one. Never errors.
    pub fn validate(&self) -> bool {
        info!(root = %self.project_root.display(), "Validating environment");
        match self.check() {
            Ok(()) => {
                info!("Environment validation passed");
                true
            }
            Err(issue) => {
                error!(%issue, "Environment validation failed");
                false
            }
        }
    }
}

fn parse_version(version: &str) -> Result<Vec<u64>, EnvironmentIssue> {
    let core = version
        .trim()
        .trim_start_matches('v')
        .split(['-', '+'])
        .next()
        .unwrap_or_default();

    core.split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| EnvironmentIssue::InvalidVersion(version.to_string()))
        })
        .collect()
}

/// Compare dotted numeric versions; missing components count as zero
pub fn version_cmp(a: &str, b: &str) -> Result<Ordering, EnvironmentIssue> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Ok(other),
        }
    }
    Ok(Ordering::Equal)
}
