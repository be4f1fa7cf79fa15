//! Domain types for the stepflow engine.
//!
//! This module contains the core data structures:
//! - Results: step and workflow outcomes with their status state machines
//! - Changes: audit records of configuration mutations

pub mod change;
pub mod result;

// Re-export commonly used types
pub use change::{ChangeSource, ConfigChange};
pub use result::{StepResult, StepStatus, WorkflowResult, WorkflowStatus};
