//! Step execution.
//!
//! Commands run through `sh -c` in the project root with stderr merged into
//! stdout. Plugins run on their own task so a panic is contained to the
//! step. Dropping the step future kills the child or aborts the plugin
//! task. Nothing here returns an error: every outcome becomes a
//! [`StepResult`].

use std::any::Any;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::StepResult;

use super::pipeline::{Params, StepAction, StepDefinition};
use super::plugin::{Plugin, PluginRegistry};
use super::template;

/// Shell invoked as `sh -c <command>` for command steps
pub const SHELL: &str = "sh";

/// Runs single steps on behalf of the pipeline runner
#[derive(Debug, Clone)]
pub struct StepExecutor {
    /// Working directory for commands and base for artifact globs
    project_root: PathBuf,
}

impl StepExecutor {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Execute one step to a terminal [`StepResult`]
    #[instrument(skip_all, fields(step = %step.name))]
    pub async fn execute(
        &self,
        step: &StepDefinition,
        params: &Params,
        plugins: &PluginRegistry,
    ) -> StepResult {
        let mut result = StepResult::new(step.name.clone());
        result.mark_running();
        info!("Running step");

        match step.action() {
            StepAction::Command(command) => {
                self.run_command(step, command, params, &mut result).await
            }
            StepAction::Plugin(name) => match plugins.get(name) {
                Some(plugin) => self.run_plugin(step, name, plugin, params, &mut result).await,
                None => {
                    warn!(plugin = %name, "Plugin not registered, skipping step");
                    result.skip(format!("Plugin '{}' is not registered", name));
                }
            },
            StepAction::Nothing => {
                warn!("Step defines neither a command nor a plugin, skipping");
                result.skip("No command or plugin specified");
            }
        }

        result
    }

    async fn run_command(
        &self,
        step: &StepDefinition,
        template: &str,
        params: &Params,
        result: &mut StepResult,
    ) {
        let command = match template::render(template, params) {
            Ok(command) => command,
            Err(e) => {
                error!(error = %e, "Failed to render command template");
                result.fail(e.to_string());
                return;
            }
        };

        debug!(%command, "Spawning command");

        match self.spawn_and_wait(&command).await {
            Ok(output) => {
                result.output = merged_output(&output);
                if output.status.success() {
                    result.artifacts = self.collect_artifacts(step);
                    info!("Step completed successfully");
                    result.succeed();
                } else {
                    let message = describe_exit(output.status);
                    error!(exit_code = ?output.status.code(), "Step failed: {}", message);
                    result.fail(message);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to run command");
                result.fail(format!("{:#}", e));
            }
        }
    }

    /// Spawn the command and wait for it to exit.
    ///
    /// `exec 2>&1` makes the shell and everything it runs write stderr into
    /// the stdout pipe, so the captured stream keeps the order
    /// lines were written in. The child is killed if this future is dropped.
    async fn spawn_and_wait(&self, command: &str) -> Result<Output> {
        let script = format!("exec 2>&1\n{}", command);

        let child = Command::new(SHELL)
            .arg("-c")
            .arg(&script)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to spawn '{}' in {}",
                    SHELL,
                    self.project_root.display()
                )
            })?;

        child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for command: {}", command))
    }

    async fn run_plugin(
        &self,
        step: &StepDefinition,
        name: &str,
        plugin: Arc<dyn Plugin>,
        params: &Params,
        result: &mut StepResult,
    ) {
        let step_def = step.clone();
        let params = params.clone();
        let mut handle = tokio::spawn(async move { plugin.execute(&step_def, &params).await });
        let _abort = AbortOnDrop(handle.abort_handle());

        match (&mut handle).await {
            Ok(Ok(true)) => {
                result.artifacts = self.collect_artifacts(step);
                info!(plugin = %name, "Step completed successfully");
                result.succeed();
            }
            Ok(Ok(false)) => {
                error!(plugin = %name, "Plugin reported failure");
                result.fail(format!("Plugin '{}' reported failure", name));
            }
            Ok(Err(e)) => {
                error!(plugin = %name, error = %e, "Plugin returned an error");
                result.fail(format!("{:#}", e));
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!(plugin = %name, %message, "Plugin panicked");
                result.fail(format!("Plugin '{}' panicked: {}", name, message));
            }
            Err(e) => {
                error!(plugin = %name, error = %e, "Plugin task did not complete");
                result.fail(format!("Plugin '{}' did not complete: {}", name, e));
            }
        }
    }

    /// Expand the step's artifact globs under the project root
    fn collect_artifacts(&self, step: &StepDefinition) -> Vec<String> {
        let mut found = Vec::new();

        for pattern in &step.artifacts {
            let full = self.project_root.join(pattern);
            let paths = match glob::glob(&full.to_string_lossy()) {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(%pattern, error = %e, "Invalid artifact pattern");
                    continue;
                }
            };

            for path in paths.filter_map(|p| p.ok()) {
                let display = path
                    .strip_prefix(&self.project_root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                if !found.contains(&display) {
                    found.push(display);
                }
            }
        }

        found
    }
}

/// Aborts a spawned plugin task when the step future is dropped mid-run
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn merged_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.stderr.is_empty() {
        text.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    text
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Command exited with code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Command terminated by signal {}", signal);
        }
    }

    "Command terminated abnormally".to_string()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
