//! Structural validation of the raw configuration document.
//!
//! Validation works on the untyped YAML tree so that every defect can be
//! reported at once, rather than stopping at the first deserialization error.

use std::collections::HashSet;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// Top-level sections every configuration must carry
pub const REQUIRED_SECTIONS: &[&str] = &["workflows", "quality_thresholds", "notifications"];

/// Notification channel types the reporting layer understands
pub const KNOWN_CHANNEL_TYPES: &[&str] = &["console", "file", "email"];

/// Environment names with a documented meaning
pub const KNOWN_ENVIRONMENTS: &[&str] = &["development", "testing", "production", "ci"];

/// Range rule for a numeric quality threshold
#[derive(Debug, Clone, Copy)]
pub struct ThresholdRule {
    pub key: &'static str,
    pub min: f64,
    pub max: f64,
    /// Safe value substituted by auto-fix
    pub default: f64,
}

impl ThresholdRule {
    pub fn accepts(&self, value: &Value) -> bool {
        value
            .as_f64()
            .map(|v| v >= self.min && v <= self.max)
            .unwrap_or(false)
    }

    /// YAML value of the default, as an integer when it has no fraction
    pub fn default_value(&self) -> Value {
        if self.default.fract() == 0.0 {
            Value::from(self.default as i64)
        } else {
            Value::from(self.default)
        }
    }
}

pub const THRESHOLD_RULES: &[ThresholdRule] = &[
    ThresholdRule {
        key: "coverage_minimum",
        min: 0.0,
        max: 100.0,
        default: 80.0,
    },
    ThresholdRule {
        key: "test_success_rate",
        min: 0.0,
        max: 100.0,
        default: 95.0,
    },
    ThresholdRule {
        key: "security_score",
        min: 0.0,
        max: 10.0,
        default: 8.0,
    },
];

/// Outcome of validating a configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn suggest(&mut self, message: impl Into<String>) {
        self.suggestions.push(message.into());
    }
}

/// Treat an absent or `null` section the same way
pub fn section<'a>(root: &'a Mapping, name: &str) -> Option<&'a Value> {
    root.get(name).filter(|v| !v.is_null())
}

/// Validate a whole configuration document
pub fn validate_document(doc: &Value) -> ValidationResult {
    let mut result = ValidationResult::new();

    let Some(root) = doc.as_mapping() else {
        result.error("Configuration root must be a mapping");
        return result;
    };

    for name in REQUIRED_SECTIONS {
        if section(root, name).is_none() {
            result.error(format!("Required section '{}' is missing", name));
            result.suggest(format!("Auto-fix inserts a default '{}' section", name));
        }
    }

    if let Some(workflows) = section(root, "workflows") {
        validate_workflows(workflows, &mut result);
    }
    if let Some(thresholds) = section(root, "quality_thresholds") {
        validate_thresholds(thresholds, &mut result);
    }
    if let Some(notifications) = section(root, "notifications") {
        validate_notifications(notifications, &mut result);
    }
    if let Some(environments) = section(root, "environments") {
        validate_environments(environments, &mut result);
    }
    if let Some(requirements) = section(root, "requirements") {
        validate_requirements(requirements, &mut result);
    }

    result
}

fn validate_workflows(workflows: &Value, result: &mut ValidationResult) {
    let Some(workflows) = workflows.as_mapping() else {
        result.error("'workflows' must be a mapping of pipeline name to definition");
        return;
    };

    for (name, workflow) in workflows {
        let name = display_key(name);

        let Some(workflow) = workflow.as_mapping() else {
            result.error(format!("Workflow '{}' must be a mapping", name));
            continue;
        };

        if let Some(enabled) = workflow.get("enabled") {
            if !enabled.is_bool() {
                result.error(format!("Workflow '{}': 'enabled' must be a boolean", name));
            }
        }

        let Some(steps) = workflow.get("steps") else {
            result.error(format!("Workflow '{}' has no 'steps'", name));
            result.suggest(format!("Add 'steps: []' to workflow '{}'", name));
            continue;
        };

        let Some(steps) = steps.as_sequence() else {
            result.error(format!("Workflow '{}': 'steps' must be a list", name));
            continue;
        };

        let mut seen = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            validate_step(&name, index, step, &mut seen, result);
        }
    }
}

fn validate_step(
    workflow: &str,
    index: usize,
    step: &Value,
    seen: &mut HashSet<String>,
    result: &mut ValidationResult,
) {
    let Some(step) = step.as_mapping() else {
        result.error(format!("Workflow '{}': step {} must be a mapping", workflow, index));
        return;
    };

    let label = match step.get("name") {
        None => {
            result.error(format!("Workflow '{}': step {} has no 'name'", workflow, index));
            index.to_string()
        }
        Some(Value::String(name)) => {
            if !seen.insert(name.clone()) {
                result.error(format!(
                    "Workflow '{}': duplicate step name '{}'",
                    workflow, name
                ));
            }
            name.clone()
        }
        Some(_) => {
            result.error(format!(
                "Workflow '{}': step {} 'name' must be a string",
                workflow, index
            ));
            index.to_string()
        }
    };

    for key in ["command", "plugin"] {
        if let Some(value) = step.get(key) {
            if !value.is_string() {
                result.error(format!(
                    "Workflow '{}': step '{}' '{}' must be a string",
                    workflow, label, key
                ));
            }
        }
    }

    if step.get("command").is_none() && step.get("plugin").is_none() {
        result.warning(format!(
            "Workflow '{}': step '{}' defines neither 'command' nor 'plugin' and will be skipped",
            workflow, label
        ));
    }

    if let Some(required) = step.get("required") {
        if !required.is_bool() {
            result.error(format!(
                "Workflow '{}': step '{}' 'required' must be a boolean",
                workflow, label
            ));
        }
    }

    if let Some(artifacts) = step.get("artifacts") {
        if !is_string_list(artifacts) {
            result.error(format!(
                "Workflow '{}': step '{}' 'artifacts' must be a list of glob patterns",
                workflow, label
            ));
        }
    }
}

fn validate_thresholds(thresholds: &Value, result: &mut ValidationResult) {
    let Some(thresholds) = thresholds.as_mapping() else {
        result.error("'quality_thresholds' must be a mapping");
        return;
    };

    for rule in THRESHOLD_RULES {
        if let Some(value) = thresholds.get(rule.key) {
            if !rule.accepts(value) {
                result.error(format!(
                    "'{}' must be a number between {} and {}",
                    rule.key, rule.min, rule.max
                ));
                result.suggest(format!(
                    "Auto-fix resets '{}' to {}",
                    rule.key, rule.default
                ));
            }
        }
    }

    for (key, value) in thresholds {
        let key = display_key(key);
        let known = THRESHOLD_RULES.iter().any(|r| r.key == key);
        if !known && !(value.is_number() || value.is_bool()) {
            result.warning(format!("Threshold '{}' is not numeric or boolean", key));
        }
    }
}

fn validate_notifications(notifications: &Value, result: &mut ValidationResult) {
    let Some(notifications) = notifications.as_mapping() else {
        result.error("'notifications' must be a mapping");
        return;
    };

    if let Some(enabled) = notifications.get("enabled") {
        if !enabled.is_bool() {
            result.error("'notifications.enabled' must be a boolean");
        }
    }

    let Some(channels) = notifications.get("channels") else {
        return;
    };
    let Some(channels) = channels.as_sequence() else {
        result.error("'notifications.channels' must be a list");
        return;
    };

    for (index, channel) in channels.iter().enumerate() {
        let Some(channel) = channel.as_mapping() else {
            result.error(format!("Notification channel {} must be a mapping", index));
            continue;
        };

        match channel.get("type") {
            None => result.error(format!("Notification channel {} has no 'type'", index)),
            Some(kind) => {
                let kind = kind.as_str().unwrap_or_default();
                if !KNOWN_CHANNEL_TYPES.contains(&kind) {
                    result.warning(format!("Unknown notification channel type: '{}'", kind));
                }
            }
        }
    }
}

fn validate_environments(environments: &Value, result: &mut ValidationResult) {
    let Some(environments) = environments.as_mapping() else {
        result.error("'environments' must be a mapping");
        return;
    };

    for (name, config) in environments {
        let name = display_key(name);
        if !KNOWN_ENVIRONMENTS.contains(&name.as_str()) {
            result.warning(format!("Unknown environment name: '{}'", name));
        }
        if !config.is_mapping() {
            result.error(format!("Environment '{}' must be a mapping", name));
        }
    }
}

fn validate_requirements(requirements: &Value, result: &mut ValidationResult) {
    let Some(requirements) = requirements.as_mapping() else {
        result.error("'requirements' must be a mapping");
        return;
    };

    if let Some(version) = requirements.get("min_version") {
        if !version.is_string() {
            result.error("'requirements.min_version' must be a string such as \"0.1.0\"");
        }
    }
    if let Some(dirs) = requirements.get("directories") {
        if !is_string_list(dirs) {
            result.error("'requirements.directories' must be a list of paths");
        }
    }
}

fn is_string_list(value: &Value) -> bool {
    value
        .as_sequence()
        .map(|items| items.iter().all(Value::is_string))
        .unwrap_or(false)
}

fn display_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
