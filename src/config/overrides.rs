//! Environment variable overrides.
//!
//! A fixed set of variables maps onto dotted configuration paths. Values are
//! coerced with [`coerce_env_value`] before they are written.

use serde_yaml::Value;

/// Environment variable → dotted configuration path
pub const ENV_MAPPINGS: &[(&str, &str)] = &[
    ("WORKFLOW_LOG_LEVEL", "notifications.channels.0.level"),
    ("WORKFLOW_COVERAGE_MIN", "quality_thresholds.coverage_minimum"),
    ("WORKFLOW_TIMEOUT", "workflows.ci_pipeline.timeout"),
    ("WORKFLOW_DEBUG", "environments.development.debug"),
    ("WORKFLOW_PARALLEL", "workflows.ci_pipeline.parallel"),
    ("WORKFLOW_CACHE_ENABLED", "cache.enabled"),
    ("WORKFLOW_NOTIFICATIONS", "notifications.enabled"),
];

const TRUE_WORDS: &[&str] = &["true", "yes", "1", "on"];
const FALSE_WORDS: &[&str] = &["false", "no", "0", "off"];

/// Coerce a raw environment string into a typed configuration value.
///
/// Attempts, in order: boolean keyword, number (float when the text contains
/// a `.`), JSON literal, and finally the raw string.
pub fn coerce_env_value(raw: &str) -> Value {
    parse_bool(raw)
        .or_else(|| parse_number(raw))
        .or_else(|| parse_json(raw))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

fn parse_bool(raw: &str) -> Option<Value> {
    let lower = raw.to_ascii_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) {
        Some(Value::Bool(true))
    } else if FALSE_WORDS.contains(&lower.as_str()) {
        Some(Value::Bool(false))
    } else {
        None
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.contains('.') {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::from)
    } else {
        trimmed.parse::<i64>().ok().map(Value::from)
    }
}

fn parse_json(raw: &str) -> Option<Value> {
    let json: serde_json::Value = serde_json::from_str(raw).ok()?;
    serde_yaml::to_value(json).ok()
}

/// Override values found through `lookup`, in mapping order
pub fn collect_overrides<F>(lookup: F) -> Vec<(&'static str, &'static str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    ENV_MAPPINGS
        .iter()
        .filter_map(|(var, path)| lookup(var).map(|value| (*var, *path, value)))
        .collect()
}

/// Current override values present in the process environment
pub fn present_overrides() -> Vec<(&'static str, &'static str, String)> {
    collect_overrides(|var| std::env::var(var).ok())
}
