//! Main engine for pipeline execution.
//!
//! Resolves a named pipeline from the configuration store, runs its steps
//! strictly in order, and folds the step outcomes into a [`WorkflowResult`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::{project_root_for, ConfigStore, ConfigurationError};
use crate::domain::{WorkflowResult, WorkflowStatus};

use super::environment::EnvironmentValidator;
use super::executor::StepExecutor;
use super::pipeline::{Params, WorkflowDefinition};
use super::plugin::{Plugin, PluginRegistry};

/// Pipeline runner
#[derive(Debug)]
pub struct WorkflowEngine {
    config: ConfigStore,
    plugins: PluginRegistry,
    executor: StepExecutor,
    project_root: PathBuf,
    required_dirs: Option<Vec<String>>,
}

impl WorkflowEngine {
    /// Load configuration from `config_path`. The project root is the
    /// directory containing `.stepflow/`, or the config file's directory.
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let config_path = config_path.as_ref();
        let project_root = project_root_for(config_path).unwrap_or_else(|| PathBuf::from("."));
        Self::with_project_root(config_path, project_root)
    }

    pub fn with_project_root(
        config_path: impl AsRef<Path>,
        project_root: impl Into<PathBuf>,
    ) -> Result<Self, ConfigurationError> {
        let config = ConfigStore::load(config_path)?;
        Ok(Self::from_store(config, project_root))
    }

    /// Wrap an already loaded store
    pub fn from_store(config: ConfigStore, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            config,
            plugins: PluginRegistry::new(),
            executor: StepExecutor::new(&project_root),
            project_root,
            required_dirs: None,
        }
    }

    /// Override `requirements.directories` for environment validation
    pub fn with_required_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_dirs = Some(dirs.into_iter().map(Into::into).collect());
        self
    }

    /// Run a pipeline to completion. Every outcome, including a missing or
    /// malformed pipeline, is reported through the returned result.
    #[instrument(skip(self, params), fields(pipeline = %name))]
    pub async fn execute_pipeline(&self, name: &str, params: &Params) -> WorkflowResult {
        let mut result = WorkflowResult::new(name);
        info!(run_id = %result.run_id, "Starting pipeline execution");

        let workflow = match self.config.workflow(name) {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                error!("Workflow not found");
                result.fail(format!("Workflow '{}' not found", name));
                return result;
            }
            Err(e) => {
                error!(error = %e, "Failed to resolve workflow");
                result.fail(e.to_string());
                return result;
            }
        };

        if !workflow.enabled {
            info!("Workflow is disabled, skipping");
            result.finish(WorkflowStatus::Skipped);
            return result;
        }

        result.status = WorkflowStatus::Running;

        for step in &workflow.steps {
            let step_result = self.executor.execute(step, params, &self.plugins).await;

            if step_result.is_failure() {
                if step.required {
                    let message = format!(
                        "Required step '{}' failed: {}",
                        step.name,
                        step_result.error.as_deref().unwrap_or("unknown error")
                    );
                    error!(step = %step.name, "Required step failed, halting pipeline");
                    result.push_step(step_result);
                    result.fail(message);
                    return result;
                }
                warn!(step = %step.name, "Optional step failed, continuing");
            }

            result.push_step(step_result);
        }

        let status = if result.failed_steps().next().is_some() {
            WorkflowStatus::Warning
        } else {
            WorkflowStatus::Success
        };
        result.finish(status);

        info!(
            %status,
            steps = result.steps.len(),
            success_rate = result.success_rate(),
            duration_ms = result.execution_time().as_millis() as u64,
            "Pipeline finished"
        );
        result
    }

    /// Names of all defined pipelines, in document order
    pub fn get_available_workflows(&self) -> Vec<String> {
        self.config.workflow_names()
    }

    /// Typed definition of one pipeline, if it exists and parses
    pub fn get_workflow_config(&self, name: &str) -> Option<WorkflowDefinition> {
        match self.config.workflow(name) {
            Ok(workflow) => workflow,
            Err(e) => {
                warn!(pipeline = %name, error = %e, "Workflow definition does not parse");
                None
            }
        }
    }

    /// Register a plugin; a later registration under the same name wins
    pub fn register_plugin(&mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) {
        let name = name.into();
        if self.plugins.register(name.clone(), plugin).is_some() {
            warn!(plugin = %name, "Replaced previously registered plugin");
        } else {
            info!(plugin = %name, "Registered plugin");
        }
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Validator built from the current configuration
    pub fn environment_validator(&self) -> EnvironmentValidator {
        let validator = EnvironmentValidator::from_config(&self.project_root, &self.config);
        match &self.required_dirs {
            Some(dirs) => validator.with_required_dirs(dirs.iter().cloned()),
            None => validator,
        }
    }

    /// Pre-flight check; failures are logged, never returned
    pub fn validate_environment(&self) -> bool {
        self.environment_validator().validate()
    }

    /// Re-read the configuration file; the change history is kept
    pub fn reload_configuration(&mut self) -> Result<(), ConfigurationError> {
        self.config.reload()
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}
