//! Configuration Store Integration Tests
//!
//! Tests for loading, repairing, overriding and saving configuration files.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_yaml::Value;
use stepflow::config::{default_config_path, ConfigStore, ConfigurationError};
use stepflow::domain::ChangeSource;
use tempfile::TempDir;

/// Loading reads WORKFLOW_* variables, so tests in this file take turns
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = default_config_path(dir);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, yaml).unwrap();
    path
}

const PROJECT_CONFIG: &str = r#"
workflows:
  ci_pipeline:
    enabled: true
    steps:
      - name: build
        command: cargo build
      - name: test
        command: cargo test {filter}
        required: false
      - name: docs
        command: cargo doc --no-deps
quality_thresholds:
  coverage_minimum: 70
  test_success_rate: 95
notifications:
  enabled: true
  channels:
    - type: console
      level: INFO
"#;

#[test]
fn test_missing_file_writes_default() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = default_config_path(temp.path());

    let store = ConfigStore::load(&path).unwrap();

    assert!(path.exists());
    assert_eq!(store.workflow_names(), vec!["pre_commit".to_string()]);

    let pre_commit = store.workflow("pre_commit").unwrap().unwrap();
    let names: Vec<&str> = pre_commit.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["lint", "format"]);
    assert!(pre_commit.steps.iter().all(|s| s.required));

    assert_eq!(store.quality_thresholds().coverage_minimum, 80.0);
    assert_eq!(store.notifications().channels[0].kind, "console");
    assert!(store.change_history().is_empty());
}

#[test]
fn test_environment_override_takes_precedence() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), PROJECT_CONFIG);

    std::env::set_var("WORKFLOW_COVERAGE_MIN", "90");
    std::env::set_var("WORKFLOW_TIMEOUT", "600");
    let loaded = ConfigStore::load(&path);
    std::env::remove_var("WORKFLOW_COVERAGE_MIN");
    std::env::remove_var("WORKFLOW_TIMEOUT");
    let store = loaded.unwrap();

    assert_eq!(
        store.get("quality_thresholds.coverage_minimum"),
        Some(Value::from(90))
    );
    assert_eq!(
        store.get("workflows.ci_pipeline.timeout"),
        Some(Value::from(600))
    );

    let coverage_changes: Vec<_> = store
        .change_history()
        .iter()
        .filter(|c| c.path == "quality_thresholds.coverage_minimum")
        .collect();
    assert_eq!(coverage_changes.len(), 1);
    assert_eq!(coverage_changes[0].source, ChangeSource::Environment);
    assert_eq!(coverage_changes[0].old_value, Value::from(70));
    assert_eq!(coverage_changes[0].new_value, Value::from(90));
    assert!(coverage_changes[0].reason.contains("WORKFLOW_COVERAGE_MIN"));

    // The override is not written back to the file
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert!(on_disk.contains("coverage_minimum: 70"));
}

#[test]
fn test_override_beats_auto_fix() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(
        temp.path(),
        "workflows: {}\nquality_thresholds:\n  coverage_minimum: 500\nnotifications: {}\n",
    );

    std::env::set_var("WORKFLOW_COVERAGE_MIN", "65.5");
    let loaded = ConfigStore::load(&path);
    std::env::remove_var("WORKFLOW_COVERAGE_MIN");
    let store = loaded.unwrap();

    let sources: Vec<ChangeSource> = store.change_history().iter().map(|c| c.source).collect();
    assert_eq!(sources, vec![ChangeSource::File, ChangeSource::Environment]);
    assert_eq!(
        store.get("quality_thresholds.coverage_minimum"),
        Some(Value::from(65.5))
    );
}

#[test]
fn test_auto_fix_on_load_then_valid() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(
        temp.path(),
        r#"
workflows:
  nightly:
    steps:
      - name: bench
        command: cargo bench
quality_thresholds:
  coverage_minimum: -5
  test_success_rate: "lots"
  security_score: 11
"#,
    );

    let mut store = ConfigStore::load(&path).unwrap();

    let validation = store.validate();
    assert!(validation.is_valid);
    assert!(validation.errors.is_empty());

    let fixed: Vec<&str> = store
        .change_history()
        .iter()
        .filter(|c| c.source == ChangeSource::File)
        .map(|c| c.path.as_str())
        .collect();
    assert_eq!(
        fixed,
        vec![
            "notifications",
            "quality_thresholds.coverage_minimum",
            "quality_thresholds.test_success_rate",
            "quality_thresholds.security_score",
        ]
    );
    assert_eq!(store.quality_thresholds().security_score, 8.0);

    // A second pass has nothing left to do
    assert!(!store.auto_fix());
}

#[test]
fn test_unfixable_file_fails_to_load() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(
        temp.path(),
        r#"
workflows:
  broken:
    steps:
      - command: echo no name
      - name: dup
        command: "true"
      - name: dup
        command: "true"
quality_thresholds: {}
notifications: {}
"#,
    );

    match ConfigStore::load(&path) {
        Err(ConfigurationError::Invalid { errors }) => {
            assert!(errors.iter().any(|e| e.contains("has no 'name'")));
            assert!(errors.iter().any(|e| e.contains("duplicate step name 'dup'")));
        }
        other => panic!("Expected Invalid, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_parse_errors_are_reported() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), "workflows: [unclosed\n");

    let err = ConfigStore::load(&path).unwrap_err();
    assert!(matches!(err, ConfigurationError::Parse { .. }));
    assert!(err.to_string().contains("config.yml"));

    let path = write_config(temp.path(), "- just\n- a list\n");
    let err = ConfigStore::load(&path).unwrap_err();
    assert!(matches!(err, ConfigurationError::NotAMapping { .. }));
}

#[test]
fn test_save_then_load_round_trips_pipelines() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), PROJECT_CONFIG);

    let mut store = ConfigStore::load(&path).unwrap();
    store
        .set("environments.ci.debug", Value::Bool(true), ChangeSource::Api)
        .unwrap();
    store.save().unwrap();

    assert_eq!(
        std::fs::read_to_string(store.backup_path()).unwrap(),
        PROJECT_CONFIG
    );

    let reloaded = ConfigStore::load(&path).unwrap();
    assert_eq!(reloaded.workflow_names(), store.workflow_names());

    let before = store.workflow("ci_pipeline").unwrap().unwrap();
    let after = reloaded.workflow("ci_pipeline").unwrap().unwrap();
    let summary = |w: &stepflow::core::WorkflowDefinition| -> Vec<(String, bool)> {
        w.steps.iter().map(|s| (s.name.clone(), s.required)).collect()
    };
    assert_eq!(summary(&before), summary(&after));
    assert_eq!(
        summary(&after),
        vec![
            ("build".to_string(), true),
            ("test".to_string(), false),
            ("docs".to_string(), true),
        ]
    );
    assert_eq!(reloaded.get("environments.ci.debug"), Some(Value::Bool(true)));
}

#[test]
fn test_reload_keeps_history() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), PROJECT_CONFIG);

    let mut store = ConfigStore::load(&path).unwrap();
    store
        .set("cache.enabled", Value::Bool(true), ChangeSource::Api)
        .unwrap();
    assert_eq!(store.change_history().len(), 1);

    std::fs::write(
        &path,
        PROJECT_CONFIG.replace("ci_pipeline:", "release:"),
    )
    .unwrap();
    store.reload().unwrap();

    assert_eq!(store.workflow_names(), vec!["release".to_string()]);
    assert_eq!(store.change_history().len(), 1);
    // The in-memory set is gone with the old document
    assert!(store.get("cache.enabled").is_none());
}

#[test]
fn test_failed_reload_keeps_previous_document() {
    let _guard = env_guard();
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), PROJECT_CONFIG);

    let mut store = ConfigStore::load(&path).unwrap();
    std::fs::write(&path, "workflows:\n  bad:\n    steps: nope\n").unwrap();

    assert!(store.reload().is_err());
    assert_eq!(store.workflow_names(), vec!["ci_pipeline".to_string()]);
}
