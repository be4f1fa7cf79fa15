//! The configuration store.
//!
//! Holds the raw YAML document as the source of truth. Typed views
//! ([`PipelineDefinition`], [`QualityThresholds`], ...) are derived from it on
//! demand so that unknown keys and dotted-path writes survive a save.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::pipeline::{
    NotificationSettings, PipelineDefinition, QualityThresholds, Requirements, WorkflowDefinition,
};
use crate::domain::{ChangeSource, ConfigChange};

use super::defaults::{default_section, DEFAULT_CONFIG_YAML};
use super::overrides::{coerce_env_value, collect_overrides, present_overrides};
use super::path::{get_path, set_path, PathError};
use super::validation::{section, validate_document, ValidationResult, REQUIRED_SECTIONS, THRESHOLD_RULES};

/// Errors raised while loading, changing or saving configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock config file {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Config file {} must contain a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },

    #[error("Configuration is invalid: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },

    #[error("Configuration does not match the expected schema: {0}")]
    Schema(#[from] serde_yaml::Error),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Loaded configuration document plus its change history
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    document: Value,
    history: Vec<ConfigChange>,
}

impl ConfigStore {
    /// Load from `path`, writing the default document first if it is missing.
    ///
    /// The document is validated, auto-fixed when invalid, and finally
    /// overlaid with environment overrides.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref().to_path_buf();
        let document = read_document(&path)?;

        let mut store = Self {
            path,
            document,
            history: Vec::new(),
        };
        store.prepare()?;
        store.apply_environment_overrides();

        info!(
            workflows = store.workflow_names().len(),
            "Configuration loaded"
        );
        Ok(store)
    }

    /// Load an in-memory document without touching the filesystem or the
    /// process environment. `save` still writes to `path`.
    pub fn from_document(
        path: impl Into<PathBuf>,
        document: Value,
    ) -> Result<Self, ConfigurationError> {
        let path = path.into();
        let document = normalize_root(document, &path)?;
        let mut store = Self {
            path,
            document,
            history: Vec::new(),
        };
        store.prepare()?;
        Ok(store)
    }

    /// Re-read the file at the same path. History is kept; on error the
    /// previous document stays in place.
    pub fn reload(&mut self) -> Result<(), ConfigurationError> {
        let document = read_document(&self.path)?;
        let previous = std::mem::replace(&mut self.document, document);

        if let Err(e) = self.prepare() {
            self.document = previous;
            return Err(e);
        }
        self.apply_environment_overrides();

        info!(path = %self.path.display(), "Configuration reloaded");
        Ok(())
    }

    /// Validate, auto-fix if needed, and fail if defects remain
    fn prepare(&mut self) -> Result<(), ConfigurationError> {
        let result = self.validate();
        if result.is_valid {
            for warning in &result.warnings {
                warn!("{}", warning);
            }
            return Ok(());
        }

        log_validation(&result);
        if self.auto_fix() {
            info!("Applied automatic fixes to configuration");
        }

        let result = self.validate();
        if !result.is_valid {
            return Err(ConfigurationError::Invalid {
                errors: result.errors,
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> ValidationResult {
        validate_document(&self.document)
    }

    /// Repair what can be repaired: missing or malformed required sections
    /// and out-of-range thresholds. Returns whether anything changed.
    pub fn auto_fix(&mut self) -> bool {
        let Some(root) = self.document.as_mapping() else {
            return false;
        };

        let mut fixes: Vec<(String, Value, String)> = Vec::new();

        for name in REQUIRED_SECTIONS {
            match section(root, name) {
                None => fixes.push((
                    name.to_string(),
                    default_section(name),
                    format!("Inserted missing section '{}'", name),
                )),
                Some(value) if !value.is_mapping() => fixes.push((
                    name.to_string(),
                    default_section(name),
                    format!("Replaced malformed section '{}'", name),
                )),
                Some(_) => {}
            }
        }

        if let Some(thresholds) = section(root, "quality_thresholds").and_then(Value::as_mapping) {
            for rule in THRESHOLD_RULES {
                match thresholds.get(rule.key) {
                    Some(value) if !rule.accepts(value) => fixes.push((
                        format!("quality_thresholds.{}", rule.key),
                        rule.default_value(),
                        format!(
                            "Reset '{}' to {} (allowed range {}-{})",
                            rule.key, rule.default, rule.min, rule.max
                        ),
                    )),
                    _ => {}
                }
            }
        }

        let mut changed = false;
        for (path, value, reason) in fixes {
            match self.record(&path, value, ChangeSource::File, reason) {
                Ok(()) => changed = true,
                Err(e) => warn!(%path, error = %e, "Auto-fix could not be applied"),
            }
        }
        changed
    }

    /// Overlay values from the process environment
    pub fn apply_environment_overrides(&mut self) -> usize {
        self.apply_overrides(present_overrides())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_overrides(collect_overrides(lookup))
    }

    fn apply_overrides(&mut self, overrides: Vec<(&'static str, &'static str, String)>) -> usize {
        let mut applied = 0;

        for (var, path, raw) in overrides {
            if let Some(workflow) = undefined_workflow(&self.document, path) {
                warn!(%var, %workflow, "Override targets an undefined workflow, skipping");
                continue;
            }

            let value = coerce_env_value(&raw);
            let reason = format!("Environment override from {}", var);
            match self.record(path, value, ChangeSource::Environment, reason) {
                Ok(()) => {
                    debug!(%var, %path, "Applied environment override");
                    applied += 1;
                }
                Err(e) => warn!(%var, %path, error = %e, "Environment override skipped"),
            }
        }

        applied
    }

    /// Value at a dotted path
    pub fn get(&self, path: &str) -> Option<Value> {
        get_path(&self.document, path).cloned()
    }

    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    /// Write a value at a dotted path and record the change
    pub fn set(
        &mut self,
        path: &str,
        value: Value,
        source: ChangeSource,
    ) -> Result<(), ConfigurationError> {
        let reason = format!("Set by {}", source);
        self.record(path, value, source, reason)?;
        Ok(())
    }

    fn record(
        &mut self,
        path: &str,
        value: Value,
        source: ChangeSource,
        reason: String,
    ) -> Result<(), PathError> {
        let old_value = set_path(&mut self.document, path, value.clone())?;
        self.history
            .push(ConfigChange::new(path, old_value, value, source, reason));
        Ok(())
    }

    /// Write the document back, keeping the previous file as `<file>.backup`
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn save(&self) -> Result<(), ConfigurationError> {
        let content = serde_yaml::to_string(&self.document)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigurationError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| ConfigurationError::Write {
                path: self.path.clone(),
                source,
            })?;

        file.lock_exclusive()
            .map_err(|source| ConfigurationError::Lock {
                path: self.path.clone(),
                source,
            })?;

        let backup = self.backup_path();
        let previous_len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if previous_len > 0 {
            fs::copy(&self.path, &backup).map_err(|source| ConfigurationError::Write {
                path: backup.clone(),
                source,
            })?;
        }

        let write_err = |source| ConfigurationError::Write {
            path: self.path.clone(),
            source,
        };
        file.set_len(0).map_err(write_err)?;
        file.write_all(content.as_bytes()).map_err(write_err)?;
        file.flush().map_err(write_err)?;

        // Lock is released when file is dropped
        info!("Configuration saved");
        Ok(())
    }

    /// Sibling path the previous file is copied to on save
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".backup");
        self.path.with_file_name(name)
    }

    pub fn change_history(&self) -> &[ConfigChange] {
        &self.history
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All pipelines, in document order
    pub fn pipelines(&self) -> Result<PipelineDefinition, ConfigurationError> {
        Ok(PipelineDefinition::from_document(&self.document)?)
    }

    /// One pipeline, parsed on its own so a defect elsewhere does not hide it
    pub fn workflow(&self, name: &str) -> Result<Option<WorkflowDefinition>, ConfigurationError> {
        match self.workflows_mapping().and_then(|w| w.get(name)) {
            Some(value) => Ok(Some(WorkflowDefinition::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Pipeline names, in document order
    pub fn workflow_names(&self) -> Vec<String> {
        self.workflows_mapping()
            .map(|w| {
                w.keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn quality_thresholds(&self) -> QualityThresholds {
        self.typed_section("quality_thresholds")
    }

    pub fn notifications(&self) -> NotificationSettings {
        self.typed_section("notifications")
    }

    pub fn requirements(&self) -> Requirements {
        self.typed_section("requirements")
    }

    fn workflows_mapping(&self) -> Option<&Mapping> {
        self.document
            .as_mapping()
            .and_then(|root| section(root, "workflows"))
            .and_then(Value::as_mapping)
    }

    fn typed_section<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let Some(value) = self.document.as_mapping().and_then(|root| section(root, name)) else {
            return T::default();
        };

        match serde_yaml::from_value(value.clone()) {
            Ok(typed) => typed,
            Err(e) => {
                warn!(section = %name, error = %e, "Section does not match its schema, using defaults");
                T::default()
            }
        }
    }
}

/// Read and parse the file, writing the embedded default when absent
fn read_document(path: &Path) -> Result<Value, ConfigurationError> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, writing default configuration");
        write_default(path)?;
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let document: Value =
        serde_yaml::from_str(&content).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    normalize_root(document, path)
}

fn write_default(path: &Path) -> Result<(), ConfigurationError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigurationError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, DEFAULT_CONFIG_YAML).map_err(|source| ConfigurationError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// An empty document is an empty mapping; any other non-mapping is an error
fn normalize_root(document: Value, path: &Path) -> Result<Value, ConfigurationError> {
    match document {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(document),
        _ => Err(ConfigurationError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

/// Name of the workflow a `workflows.<name>...` path points into, if that
/// workflow is not defined
fn undefined_workflow<'a>(document: &Value, path: &'a str) -> Option<&'a str> {
    let mut parts = path.split('.');
    if parts.next() != Some("workflows") {
        return None;
    }
    let name = parts.next()?;
    let defined = document
        .get("workflows")
        .and_then(Value::as_mapping)
        .map(|w| w.contains_key(name))
        .unwrap_or(false);
    (!defined).then_some(name)
}

fn log_validation(result: &ValidationResult) {
    for error in &result.errors {
        warn!("Configuration error: {}", error);
    }
    for warning in &result.warnings {
        warn!("Configuration warning: {}", warning);
    }
    for suggestion in &result.suggestions {
        debug!("Suggestion: {}", suggestion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn store(yaml: &str) -> ConfigStore {
        let doc: Value = serde_yaml::from_str(yaml).unwrap();
        ConfigStore::from_document("/nonexistent/config.yml", doc).unwrap()
    }

    const BASE: &str = r#"
workflows:
  ci_pipeline:
    steps:
      - name: build
        command: cargo build
quality_thresholds:
  coverage_minimum: 80
notifications:
  enabled: true
  channels:
    - type: console
      level: INFO
"#;

    #[test]
    fn test_missing_sections_are_fixed_and_recorded() {
        let store = store("workflows: {}\n");

        assert!(store.validate().is_valid);
        assert!(store.get("quality_thresholds.coverage_minimum").is_some());
        assert_eq!(
            store.get("notifications.channels.0.type"),
            Some(Value::from("console"))
        );

        let paths: Vec<&str> = store.change_history().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["quality_thresholds", "notifications"]);
        assert!(store
            .change_history()
            .iter()
            .all(|c| c.source == ChangeSource::File && c.old_value.is_null()));
    }

    #[test]
    fn test_out_of_range_thresholds_reset() {
        let store = store(
            "workflows: {}\nquality_thresholds:\n  coverage_minimum: 150\n  security_score: high\nnotifications: {}\n",
        );

        assert_eq!(store.get("quality_thresholds.coverage_minimum"), Some(Value::from(80)));
        assert_eq!(store.get("quality_thresholds.security_score"), Some(Value::from(8)));

        let change = &store.change_history()[0];
        assert_eq!(change.old_value, Value::from(150));
        assert_eq!(change.new_value, Value::from(80));
    }

    #[test]
    fn test_auto_fix_is_idempotent() {
        let mut store = store(BASE);
        assert!(!store.auto_fix());
        assert!(store.change_history().is_empty());
    }

    #[test]
    fn test_unfixable_document_is_rejected() {
        let doc: Value = serde_yaml::from_str("workflows:\n  ci:\n    enabled: true\n").unwrap();
        let err = ConfigStore::from_document("/x/config.yml", doc).unwrap_err();
        match err {
            ConfigurationError::Invalid { errors } => {
                assert!(errors.iter().any(|e| e.contains("'ci' has no 'steps'")));
            }
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_non_mapping_root_is_rejected() {
        let err = ConfigStore::from_document("/x/config.yml", Value::from("text")).unwrap_err();
        assert!(matches!(err, ConfigurationError::NotAMapping { .. }));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let mut store = store(BASE);
        let vars: HashMap<&str, &str> = [
            ("WORKFLOW_COVERAGE_MIN", "90"),
            ("WORKFLOW_LOG_LEVEL", "DEBUG"),
            ("WORKFLOW_TIMEOUT", "300"),
            ("WORKFLOW_CACHE_ENABLED", "yes"),
        ]
        .into_iter()
        .collect();

        let applied = store.apply_overrides_from(|v| vars.get(v).map(|s| s.to_string()));

        assert_eq!(applied, 4);
        assert_eq!(store.get("quality_thresholds.coverage_minimum"), Some(Value::from(90)));
        assert_eq!(store.get("notifications.channels.0.level"), Some(Value::from("DEBUG")));
        assert_eq!(store.get("workflows.ci_pipeline.timeout"), Some(Value::from(300)));
        assert_eq!(store.get("cache.enabled"), Some(Value::Bool(true)));
        assert!(store
            .change_history()
            .iter()
            .all(|c| c.source == ChangeSource::Environment));
    }

    #[test]
    fn test_override_for_undefined_workflow_is_skipped() {
        let mut store =
            store("workflows: {}\nquality_thresholds: {}\nnotifications:\n  channels: []\n");

        let applied = store.apply_overrides_from(|v| {
            (v == "WORKFLOW_PARALLEL" || v == "WORKFLOW_LOG_LEVEL").then(|| "4".to_string())
        });

        // ci_pipeline is undefined and the channel list is empty
        assert_eq!(applied, 0);
        assert!(store.workflow_names().is_empty());
        assert!(store.change_history().is_empty());
    }

    #[test]
    fn test_log_level_override_without_channels_is_skipped() {
        let mut store = store("workflows: {}\nquality_thresholds: {}\nnotifications:\n  enabled: true\n");

        let applied = store
            .apply_overrides_from(|v| (v == "WORKFLOW_LOG_LEVEL").then(|| "DEBUG".to_string()));

        assert_eq!(applied, 0);
        assert!(store.get("notifications.channels").is_none());
        assert!(store.change_history().is_empty());
        assert!(store.validate().is_valid);
    }

    #[test]
    fn test_set_records_change_and_creates_parents() {
        let mut store = store(BASE);
        store
            .set("environments.ci.debug", Value::Bool(false), ChangeSource::Api)
            .unwrap();

        assert_eq!(store.get("environments.ci.debug"), Some(Value::Bool(false)));
        let change = store.change_history().last().unwrap();
        assert_eq!(change.path, "environments.ci.debug");
        assert_eq!(change.source, ChangeSource::Api);
        assert!(change.old_value.is_null());

        let err = store
            .set("notifications.channels.5.level", Value::from("x"), ChangeSource::Api)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Path(_)));
        assert_eq!(store.change_history().len(), 1);
    }

    #[test]
    fn test_get_or() {
        let store = store(BASE);
        assert_eq!(store.get_or("cache.enabled", Value::Bool(false)), Value::Bool(false));
        assert_eq!(
            store.get_or("quality_thresholds.coverage_minimum", Value::from(0)),
            Value::from(80)
        );
    }

    #[test]
    fn test_typed_views() {
        let store = store(BASE);
        assert_eq!(store.workflow_names(), vec!["ci_pipeline".to_string()]);
        assert_eq!(store.quality_thresholds().coverage_minimum, 80.0);
        assert_eq!(store.quality_thresholds().test_success_rate, 95.0);
        assert_eq!(store.notifications().channels[0].kind, "console");
        assert_eq!(store.requirements(), Requirements::default());

        let ci = store.workflow("ci_pipeline").unwrap().unwrap();
        assert_eq!(ci.steps[0].name, "build");
        assert!(store.workflow("missing").unwrap().is_none());
    }

    #[test]
    fn test_pipelines_view_keeps_document_order() {
        let mut store = store(BASE);
        store
            .set(
                "workflows.docs",
                serde_yaml::from_str("{enabled: false, steps: []}").unwrap(),
                ChangeSource::Api,
            )
            .unwrap();

        let pipelines = store.pipelines().unwrap();
        let listed: Vec<(&str, bool, usize)> = pipelines
            .iter()
            .map(|(name, w)| (name, w.enabled, w.steps.len()))
            .collect();
        assert_eq!(listed, vec![("ci_pipeline", true, 1), ("docs", false, 0)]);

        store
            .set("workflows.docs.steps", Value::from("oops"), ChangeSource::Api)
            .unwrap();
        assert!(matches!(store.pipelines(), Err(ConfigurationError::Schema(_))));
    }

    #[test]
    fn test_load_writes_default_and_save_keeps_backup() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".stepflow").join("config.yml");

        let doc = read_document(&path).unwrap();
        assert!(path.exists());
        assert!(doc.get("workflows").and_then(|w| w.get("pre_commit")).is_some());

        let mut store = ConfigStore::from_document(&path, doc).unwrap();
        store
            .set("quality_thresholds.coverage_minimum", Value::from(70), ChangeSource::Api)
            .unwrap();
        store.save().unwrap();

        let backup = fs::read_to_string(store.backup_path()).unwrap();
        assert_eq!(backup, DEFAULT_CONFIG_YAML);
        let saved = fs::read_to_string(&path).unwrap();
        assert!(saved.contains("coverage_minimum: 70"));
    }

    #[test]
    fn test_empty_file_is_empty_mapping() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "").unwrap();

        let doc = read_document(&path).unwrap();
        assert_eq!(doc, Value::Mapping(Mapping::new()));
    }

    #[test]
    fn test_backup_path() {
        let store = store(BASE);
        assert_eq!(store.backup_path(), PathBuf::from("/nonexistent/config.yml.backup"));
    }
}
