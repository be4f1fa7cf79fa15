//! Command-line interface for stepflow.
//!
//! Provides commands for running pipelines, listing and inspecting them,
//! validating configuration, checking the environment, and reading or
//! changing configuration values.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_yaml::Value;
use tracing::warn;

use crate::config::validation::validate_document;
use crate::config::{coerce_env_value, project_root_for, resolve_config_path};
use crate::core::{template, Params, WorkflowDefinition, WorkflowEngine};
use crate::domain::{ChangeSource, StepStatus, WorkflowResult};

/// stepflow - YAML-defined workflow orchestration engine
#[derive(Parser, Debug)]
#[command(name = "stepflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: search for .stepflow/config.yml from the project root upwards)
    #[arg(long, global = true, env = "STEPFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory commands run in (default: the directory owning the config)
    #[arg(long, global = true, env = "STEPFLOW_PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline
    Run {
        /// Pipeline name
        pipeline_name: String,

        /// Template parameter as key=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Cancel the run after this many seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Do not run the environment check first
        #[arg(long)]
        skip_env_check: bool,
    },

    /// List defined pipelines
    List,

    /// Show a pipeline definition
    Show {
        /// Pipeline name
        pipeline_name: String,
    },

    /// Validate the config file as it is on disk
    Validate,

    /// Run the environment pre-flight check
    CheckEnv,

    /// Print the value at a dotted configuration path
    Get {
        /// Dotted path, e.g. quality_thresholds.coverage_minimum
        path: String,
    },

    /// Set a dotted configuration path and save the file
    Set {
        /// Dotted path, e.g. notifications.channels.0.level
        path: String,

        /// Value (true/false, numbers and JSON are recognized)
        value: String,
    },

    /// Show configuration changes made while loading (auto-fix, environment)
    History {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Expected key=value, got '{}'", s)),
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<ExitCode> {
        match &self.command {
            Commands::Run {
                pipeline_name,
                params,
                json,
                deadline,
                skip_env_check,
            } => {
                let engine = self.load_engine()?;
                let params: Params = params.iter().cloned().collect();
                run_pipeline(&engine, pipeline_name, &params, *json, *deadline, *skip_env_check)
                    .await
            }
            Commands::List => list_workflows(&self.load_engine()?),
            Commands::Show { pipeline_name } => show_workflow(&self.load_engine()?, pipeline_name),
            Commands::Validate => validate_config(&self.config_path()?),
            Commands::CheckEnv => check_env(&self.load_engine()?),
            Commands::Get { path } => get_value(&self.load_engine()?, path),
            Commands::Set { path, value } => {
                let mut engine = self.load_engine()?;
                set_value(&mut engine, path, value)
            }
            Commands::History { json } => show_history(&self.load_engine()?, *json),
        }
    }

    fn start_dir(&self) -> Result<PathBuf> {
        match &self.project_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        Ok(resolve_config_path(self.config.as_deref(), &self.start_dir()?))
    }

    fn load_engine(&self) -> Result<WorkflowEngine> {
        let start = self.start_dir()?;
        let config_path = resolve_config_path(self.config.as_deref(), &start);
        let project_root = match &self.project_root {
            Some(root) => root.clone(),
            None => project_root_for(&config_path).unwrap_or(start),
        };

        WorkflowEngine::with_project_root(&config_path, project_root).with_context(|| {
            format!("Failed to load configuration from {}", config_path.display())
        })
    }
}

/// Run a pipeline and print its result
async fn run_pipeline(
    engine: &WorkflowEngine,
    pipeline_name: &str,
    params: &Params,
    json: bool,
    deadline: Option<u64>,
    skip_env_check: bool,
) -> Result<ExitCode> {
    if !skip_env_check && !engine.validate_environment() {
        eprintln!("Environment validation failed; rerun with --skip-env-check to ignore");
        return Ok(ExitCode::FAILURE);
    }

    let result = match deadline {
        Some(secs) => {
            let run = engine.execute_pipeline(pipeline_name, params);
            // Dropping the run future kills the running child process
            match tokio::time::timeout(Duration::from_secs(secs), run).await {
                Ok(result) => result,
                Err(_) => WorkflowResult::cancelled(
                    pipeline_name,
                    format!("Deadline of {}s exceeded", secs),
                ),
            }
        }
        None => engine.execute_pipeline(pipeline_name, params).await,
    };

    if json {
        let output = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{}", output);
    } else {
        print_result(&result);
    }

    Ok(if result.status.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_result(result: &WorkflowResult) {
    if !result.steps.is_empty() {
        println!("{:<24} {:<10} {:>10}", "STEP", "STATUS", "DURATION");
        println!("{}", "-".repeat(46));
    }

    for step in &result.steps {
        println!(
            "{:<24} {:<10} {:>9.2}s",
            step.name,
            step.status,
            step.execution_time().as_secs_f64()
        );

        match step.status {
            StepStatus::Failure => {
                for line in step.output.lines() {
                    println!("    | {}", line);
                }
                if let Some(error) = &step.error {
                    println!("    ! {}", error);
                }
            }
            StepStatus::Skipped => println!("    - {}", step.output),
            _ => {}
        }
    }

    if !result.artifacts.is_empty() {
        println!("\nArtifacts:");
        for artifact in &result.artifacts {
            println!("  {}", artifact);
        }
    }

    eprintln!(
        "\n[Run {} {}: {}/{} steps succeeded ({:.1}%) in {:.2}s]",
        result.run_id,
        result.status,
        result.successful_steps(),
        result.steps.len(),
        result.success_rate(),
        result.execution_time().as_secs_f64()
    );
    if let Some(error) = &result.error {
        eprintln!("[Error: {}]", error);
    }
}

/// List defined pipelines
fn list_workflows(engine: &WorkflowEngine) -> Result<ExitCode> {
    let names = engine.get_available_workflows();
    if names.is_empty() {
        println!("No workflows defined");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<24} {:<10} {:>6}", "WORKFLOW", "ENABLED", "STEPS");
    println!("{}", "-".repeat(42));

    match engine.config().pipelines() {
        Ok(pipelines) => {
            for (name, workflow) in pipelines.iter() {
                print_workflow_row(name, Some(workflow));
            }
        }
        // One malformed pipeline should not hide the others
        Err(e) => {
            warn!(error = %e, "Some workflows failed to parse");
            for name in names {
                print_workflow_row(&name, engine.get_workflow_config(&name).as_ref());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_workflow_row(name: &str, workflow: Option<&WorkflowDefinition>) {
    match workflow {
        Some(workflow) => println!(
            "{:<24} {:<10} {:>6}",
            name,
            if workflow.enabled { "yes" } else { "no" },
            workflow.steps.len()
        ),
        None => println!("{:<24} {:<10} {:>6}", name, "invalid", "-"),
    }
}

/// Show a pipeline definition as YAML
fn show_workflow(engine: &WorkflowEngine, pipeline_name: &str) -> Result<ExitCode> {
    let Some(workflow) = engine.get_workflow_config(pipeline_name) else {
        eprintln!("Workflow '{}' not found", pipeline_name);
        return Ok(ExitCode::FAILURE);
    };

    let yaml = serde_yaml::to_string(&workflow).context("Failed to serialize workflow")?;
    println!("{}:", pipeline_name);
    for line in yaml.lines() {
        println!("  {}", line);
    }

    let mut parameters: Vec<String> = workflow
        .steps
        .iter()
        .filter_map(|step| step.command.as_deref())
        .flat_map(template::placeholders)
        .collect();
    parameters.sort();
    parameters.dedup();
    if !parameters.is_empty() {
        println!("\nParameters: {}", parameters.join(", "));
    }

    Ok(ExitCode::SUCCESS)
}

/// Validate the file on disk without repairing it
fn validate_config(config_path: &Path) -> Result<ExitCode> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    let document: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

    let result = validate_document(&document);

    println!("Config: {}", config_path.display());
    for error in &result.errors {
        println!("  error: {}", error);
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    for suggestion in &result.suggestions {
        println!("  suggestion: {}", suggestion);
    }

    if result.is_valid {
        println!("Configuration is valid");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("Configuration is invalid ({} errors)", result.errors.len());
        Ok(ExitCode::FAILURE)
    }
}

fn check_env(engine: &WorkflowEngine) -> Result<ExitCode> {
    match engine.environment_validator().check() {
        Ok(()) => {
            println!("Environment OK ({})", engine.project_root().display());
            Ok(ExitCode::SUCCESS)
        }
        Err(issue) => {
            println!("Environment check failed: {}", issue);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn get_value(engine: &WorkflowEngine, path: &str) -> Result<ExitCode> {
    match engine.config().get(path) {
        Some(value) => {
            let yaml = serde_yaml::to_string(&value).context("Failed to serialize value")?;
            print!("{}", yaml);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("No value at '{}'", path);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn set_value(engine: &mut WorkflowEngine, path: &str, raw: &str) -> Result<ExitCode> {
    let value = coerce_env_value(raw);
    let config = engine.config_mut();

    config
        .set(path, value.clone(), ChangeSource::Api)
        .with_context(|| format!("Failed to set '{}'", path))?;

    let validation = config.validate();
    if !validation.is_valid {
        eprintln!("Refusing to save, the change makes the configuration invalid:");
        for error in &validation.errors {
            eprintln!("  {}", error);
        }
        return Ok(ExitCode::FAILURE);
    }

    config.save().context("Failed to save configuration")?;
    println!(
        "{} = {}",
        path,
        serde_yaml::to_string(&value)
            .context("Failed to serialize value")?
            .trim_end()
    );
    Ok(ExitCode::SUCCESS)
}

fn show_history(engine: &WorkflowEngine, json: bool) -> Result<ExitCode> {
    let history = engine.config().change_history();

    if json {
        let output = serde_json::to_string_pretty(history).context("Failed to serialize history")?;
        println!("{}", output);
        return Ok(ExitCode::SUCCESS);
    }

    if history.is_empty() {
        println!("No changes recorded");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<20} {:<12} {:<40} {}", "TIME", "SOURCE", "PATH", "REASON");
    println!("{}", "-".repeat(100));
    for change in history {
        println!(
            "{:<20} {:<12} {:<40} {}",
            change.timestamp.format("%Y-%m-%d %H:%M:%S"),
            change.source,
            change.path,
            change.reason
        );
    }

    Ok(ExitCode::SUCCESS)
}
