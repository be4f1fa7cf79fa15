//! Step and workflow results.
//!
//! A `StepResult` is created `pending`, moves to `running` right before its
//! step executes and then settles into exactly one terminal state. A
//! `WorkflowResult` collects the step results of one pipeline invocation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Created, not yet started
    Pending,

    /// Currently executing
    Running,

    /// Finished with a zero exit code or a truthy plugin result
    Success,

    /// Finished unsuccessfully
    Failure,

    /// Nothing to execute
    Skipped,
}

impl StepStatus {
    /// Whether this status ends the step lifecycle
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Status of a pipeline invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,

    /// Every step succeeded (or was skipped)
    Success,

    /// A required step failed, or the pipeline could not be resolved
    Failure,

    /// All steps ran but at least one optional step failed
    Warning,

    /// The pipeline is disabled
    Skipped,

    /// Abandoned by the host before it finished
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Outcomes a caller should treat as "did not break anything"
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Success | Self::Warning | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Warning => "warning",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name from the pipeline definition
    pub name: String,

    pub status: StepStatus,

    /// When the runner began this step
    pub start_time: DateTime<Utc>,

    /// When the step reached a terminal state
    pub end_time: Option<DateTime<Utc>>,

    /// Captured stdout+stderr, or a skip reason
    #[serde(default)]
    pub output: String,

    /// Error message if failed
    pub error: Option<String>,

    /// Files produced by the step
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl StepResult {
    /// Create a pending result stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            output: String::new(),
            error: None,
            artifacts: Vec::new(),
        }
    }

    /// Pending → Running
    pub fn mark_running(&mut self) {
        if self.status != StepStatus::Pending {
            warn!(step = %self.name, status = %self.status, "Ignoring transition to running");
            return;
        }
        self.status = StepStatus::Running;
    }

    pub fn succeed(&mut self) {
        self.finish(StepStatus::Success, None);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.finish(StepStatus::Failure, Some(error.into()));
    }

    /// Skip the step, recording the reason as its output
    pub fn skip(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.output = reason.into();
        }
        self.finish(StepStatus::Skipped, None);
    }

    fn finish(&mut self, status: StepStatus, error: Option<String>) {
        if self.status.is_terminal() {
            warn!(
                step = %self.name,
                current = %self.status,
                requested = %status,
                "Step already finished, ignoring transition"
            );
            return;
        }
        self.status = status;
        self.error = error;
        self.end_time = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failure
    }

    /// Wall-clock time between start and end (zero until finished)
    pub fn execution_time(&self) -> Duration {
        elapsed(self.start_time, self.end_time)
    }
}

/// Outcome of one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Unique identifier for this invocation
    pub run_id: Uuid,

    pub workflow_name: String,

    pub status: WorkflowStatus,

    pub start_time: DateTime<Utc>,

    pub end_time: Option<DateTime<Utc>>,

    /// One entry per executed step, in execution order
    #[serde(default)]
    pub steps: Vec<StepResult>,

    /// Files produced by all steps
    #[serde(default)]
    pub artifacts: Vec<String>,

    pub error: Option<String>,
}

impl WorkflowResult {
    /// Create a pending result for a pipeline
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            status: WorkflowStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            steps: Vec::new(),
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// Result for an invocation the host abandoned (e.g. past a deadline)
    pub fn cancelled(workflow_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut result = Self::new(workflow_name);
        result.finish(WorkflowStatus::Cancelled);
        result.error = Some(reason.into());
        result
    }

    /// Append a finished step, collecting its artifacts
    pub fn push_step(&mut self, step: StepResult) {
        self.artifacts.extend(step.artifacts.iter().cloned());
        self.steps.push(step);
    }

    /// Settle into a terminal status and stamp the end time
    pub fn finish(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }

    /// Settle into `Failure` with an error message
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finish(WorkflowStatus::Failure);
    }

    pub fn successful_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.is_failure())
    }

    /// Percentage of executed steps that succeeded (0.0 when none ran)
    pub fn success_rate(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.successful_steps() as f64 / self.steps.len() as f64 * 100.0
    }

    pub fn execution_time(&self) -> Duration {
        elapsed(self.start_time, self.end_time)
    }
}

fn elapsed(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Duration {
    end.and_then(|end| (end - start).to_std().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_lifecycle() {
        let mut step = StepResult::new("lint");
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.end_time.is_none());

        step.mark_running();
        assert_eq!(step.status, StepStatus::Running);

        step.fail("exit code 2");
        assert_eq!(step.status, StepStatus::Failure);
        assert_eq!(step.error.as_deref(), Some("exit code 2"));
        assert!(step.end_time.is_some());
    }

    #[test]
    fn test_terminal_step_is_never_reentered() {
        let mut step = StepResult::new("build");
        step.mark_running();
        step.succeed();

        step.fail("late failure");
        step.mark_running();
        step.skip("too late");

        assert_eq!(step.status, StepStatus::Success);
        assert!(step.error.is_none());
        assert!(step.output.is_empty());
    }

    #[test]
    fn test_skip_records_reason() {
        let mut step = StepResult::new("docs");
        step.mark_running();
        step.skip("no command or plugin");

        assert_eq!(step.status, StepStatus::Skipped);
        assert_eq!(step.output, "no command or plugin");
    }

    #[test]
    fn test_success_rate() {
        let mut result = WorkflowResult::new("pre_commit");
        assert_eq!(result.success_rate(), 0.0);

        let mut ok = StepResult::new("lint");
        ok.mark_running();
        ok.succeed();
        let mut bad = StepResult::new("format");
        bad.mark_running();
        bad.fail("exit code 1");

        result.push_step(ok);
        result.push_step(bad);

        assert_eq!(result.successful_steps(), 1);
        assert!((result.success_rate() - 50.0).abs() < f64::EPSILON);
        assert_eq!(result.failed_steps().count(), 1);
    }

    #[test]
    fn test_push_step_collects_artifacts() {
        let mut result = WorkflowResult::new("release");
        let mut step = StepResult::new("package");
        step.artifacts = vec!["dist/app.tar.gz".to_string()];
        result.push_step(step);

        assert_eq!(result.artifacts, vec!["dist/app.tar.gz".to_string()]);
    }

    #[test]
    fn test_cancelled_result() {
        let result = WorkflowResult::cancelled("ci_pipeline", "deadline exceeded");
        assert_eq!(result.status, WorkflowStatus::Cancelled);
        assert!(result.status.is_terminal());
        assert!(!result.status.is_ok());
        assert_eq!(result.error.as_deref(), Some("deadline exceeded"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&WorkflowStatus::Warning).unwrap();
        assert_eq!(json, "\"warning\"");

        let parsed: StepStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(parsed, StepStatus::Skipped);
    }
}
