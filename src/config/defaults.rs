//! Embedded default configuration.

use serde_yaml::{Mapping, Value};

use super::validation::THRESHOLD_RULES;

/// Document written when no configuration file exists yet
pub const DEFAULT_CONFIG_YAML: &str = r#"# stepflow pipeline configuration
workflows:
  pre_commit:
    enabled: true
    steps:
      - name: lint
        command: cargo clippy --all-targets -- -D warnings
        required: true
      - name: format
        command: cargo fmt --all -- --check
        required: true
quality_thresholds:
  coverage_minimum: 80
  test_success_rate: 95
notifications:
  enabled: true
  channels:
    - type: console
      level: INFO
"#;

/// Default content for a missing required section
pub fn default_section(name: &str) -> Value {
    match name {
        "quality_thresholds" => {
            let mut thresholds = Mapping::new();
            for rule in THRESHOLD_RULES.iter().filter(|r| r.key != "security_score") {
                thresholds.insert(Value::from(rule.key), rule.default_value());
            }
            Value::Mapping(thresholds)
        }
        "notifications" => {
            let mut channel = Mapping::new();
            channel.insert(Value::from("type"), Value::from("console"));
            channel.insert(Value::from("level"), Value::from("INFO"));

            let mut notifications = Mapping::new();
            notifications.insert(Value::from("enabled"), Value::Bool(true));
            notifications.insert(
                Value::from("channels"),
                Value::Sequence(vec![Value::Mapping(channel)]),
            );
            Value::Mapping(notifications)
        }
        _ => Value::Mapping(Mapping::new()),
    }
}
