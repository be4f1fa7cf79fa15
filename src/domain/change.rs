//! Configuration change records.
//!
//! Every mutation of the configuration document is recorded as an immutable
//! `ConfigChange` in an append-only history owned by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// A single configuration mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    /// When the change was applied
    pub timestamp: DateTime<Utc>,

    /// Dotted path of the changed value (e.g. "quality_thresholds.coverage_minimum")
    pub path: String,

    /// Value before the change (`Null` if absent)
    pub old_value: Value,

    /// Value after the change
    pub new_value: Value,

    /// Who made the change
    pub source: ChangeSource,

    /// Human-readable reason
    pub reason: String,
}

impl ConfigChange {
    /// Create a change record stamped with the current time
    pub fn new(
        path: impl Into<String>,
        old_value: Value,
        new_value: Value,
        source: ChangeSource,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            path: path.into(),
            old_value,
            new_value,
            source,
            reason: reason.into(),
        }
    }
}

/// Origin of a configuration change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// Load-time repair of the file contents
    File,

    /// Environment variable override
    Environment,

    /// Programmatic `set`
    Api,
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::File => "file",
            Self::Environment => "environment",
            Self::Api => "api",
        })
    }
}
