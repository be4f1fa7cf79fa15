//! Typed pipeline definitions.
//!
//! Pipelines are defined in YAML under the `workflows` key and consist of
//! ordered steps, each running either a shell command template or a
//! registered plugin. Unknown keys are preserved in `extra` so documents
//! round-trip without loss.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Parameters supplied by the caller of a pipeline
pub type Params = HashMap<String, String>;

fn default_true() -> bool {
    true
}

/// All pipelines of a configuration document, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineDefinition {
    workflows: Vec<(String, WorkflowDefinition)>,
}

impl PipelineDefinition {
    /// Build from a full configuration document (reads its `workflows` key)
    pub fn from_document(doc: &Value) -> Result<Self, serde_yaml::Error> {
        let mut workflows = Vec::new();

        if let Some(map) = doc.get("workflows").and_then(Value::as_mapping) {
            for (name, definition) in map {
                let name = name.as_str().map(str::to_string).unwrap_or_else(|| {
                    serde_yaml::to_string(name)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default()
                });
                let definition = WorkflowDefinition::from_value(definition.clone())?;
                workflows.push((name, definition));
            }
        }

        Ok(Self { workflows })
    }

    /// Parse a full configuration document from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let doc: Value = serde_yaml::from_str(content)?;
        Self::from_document(&doc)
    }

    pub fn get(&self, name: &str) -> Option<&WorkflowDefinition> {
        self.workflows
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| w)
    }

    pub fn names(&self) -> Vec<&str> {
        self.workflows.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkflowDefinition)> {
        self.workflows.iter().map(|(n, w)| (n.as_str(), w))
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// A single named pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Disabled pipelines are reported as skipped without running any step
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ordered list of steps to execute
    pub steps: Vec<StepDefinition>,

    /// Keys this engine does not interpret (e.g. `timeout`, `parallel`)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WorkflowDefinition {
    /// Deserialize from a YAML node
    pub fn from_value(value: Value) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_value(value)
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get the index of a step by name
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step name (unique within pipeline)
    pub name: String,

    /// Shell command template, e.g. `pytest {test_dir}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Name of a registered plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    /// Whether a failure halts the pipeline
    #[serde(default = "default_true")]
    pub required: bool,

    /// Glob patterns (relative to the project root) for files this step produces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StepDefinition {
    /// Shell command step
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: Some(command.into()),
            plugin: None,
            required: true,
            artifacts: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Plugin step
    pub fn plugin(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: None,
            plugin: Some(plugin.into()),
            required: true,
            artifacts: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// What this step will do when executed. A command takes precedence
    /// over a plugin; blank values count as absent.
    pub fn action(&self) -> StepAction<'_> {
        let command = self.command.as_deref().filter(|c| !c.trim().is_empty());
        let plugin = self.plugin.as_deref().filter(|p| !p.trim().is_empty());

        match (command, plugin) {
            (Some(command), _) => StepAction::Command(command),
            (None, Some(plugin)) => StepAction::Plugin(plugin),
            (None, None) => StepAction::Nothing,
        }
    }
}

/// Resolved action of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction<'a> {
    Command(&'a str),
    Plugin(&'a str),
    Nothing,
}

/// Numeric quality gates consulted by reporting layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_coverage_minimum")]
    pub coverage_minimum: f64,

    #[serde(default = "default_test_success_rate")]
    pub test_success_rate: f64,

    #[serde(default = "default_security_score")]
    pub security_score: f64,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_coverage_minimum() -> f64 {
    80.0
}
fn default_test_success_rate() -> f64 {
    95.0
}
fn default_security_score() -> f64 {
    8.0
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            coverage_minimum: default_coverage_minimum(),
            test_success_rate: default_test_success_rate(),
            security_score: default_security_score(),
            extra: BTreeMap::new(),
        }
    }
}

/// Notification settings consumed by reporting layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    /// console, file or email
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Pre-flight requirements checked by the environment validator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    /// Minimum engine version, e.g. "0.1.0"
    #[serde(default)]
    pub min_version: Option<String>,

    /// Directories that must exist under the project root
    #[serde(default)]
    pub directories: Vec<String>,
}
