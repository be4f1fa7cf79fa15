//! stepflow - YAML-defined workflow orchestration engine
//!
//! Loads pipeline definitions from a YAML file, runs named pipelines as
//! ordered sequences of shell commands or registered plugins, and reports
//! per-step and per-pipeline results.
//!
//! # Architecture
//!
//! - The configuration document is loaded once, validated, repaired where a
//!   safe default exists, and overlaid with `WORKFLOW_*` environment variables
//! - Every configuration mutation is recorded in an append-only change history
//! - Steps run strictly in order; a failing required step halts the pipeline,
//!   a failing optional step degrades it to a warning
//!
//! # Modules
//!
//! - `config`: Configuration store, validation, auto-fix, env overrides
//! - `core`: Engine, step executor, plugins, pipeline definitions
//! - `domain`: Results and change records
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # List pipelines
//! stepflow list
//!
//! # Run a pipeline with a template parameter
//! stepflow run pre_commit -p target=src
//!
//! # Inspect or change configuration
//! stepflow get quality_thresholds.coverage_minimum
//! stepflow set quality_thresholds.coverage_minimum 85
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use config::{ConfigStore, ConfigurationError, ValidationResult};
pub use crate::core::{Params, Plugin, StepDefinition, WorkflowEngine};
pub use domain::{ChangeSource, ConfigChange, StepResult, StepStatus, WorkflowResult, WorkflowStatus};
