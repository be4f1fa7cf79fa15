//! Core orchestration logic.
//!
//! This module contains:
//! - Pipeline: Typed pipeline, step, threshold and notification definitions
//! - Template: `{name}` substitution in step commands
//! - Plugin: Plugin trait and registry
//! - Executor: Runs a single step (shell command or plugin)
//! - Environment: Pre-flight checks
//! - Engine: Main execution engine

pub mod engine;
pub mod environment;
pub mod executor;
pub mod pipeline;
pub mod plugin;
pub mod template;

// Re-export commonly used types
pub use engine::WorkflowEngine;
pub use environment::{EnvironmentIssue, EnvironmentValidator, ENGINE_VERSION, MIN_ENGINE_VERSION};
pub use executor::StepExecutor;
pub use pipeline::{
    NotificationChannel, NotificationSettings, Params, PipelineDefinition, QualityThresholds,
    Requirements, StepAction, StepDefinition, WorkflowDefinition,
};
pub use plugin::{FnPlugin, Plugin, PluginRegistry};
pub use template::TemplateError;
