// Execution Engine Module
// Handles matrix expansion, step gating, command resolution and job execution

pub mod events;
pub mod executor;
pub mod gate;
pub mod matrix;
pub mod runner;
pub mod template;

// Re-export key types
pub use events::{progress_channel, ExecutionEvent, ProgressSender};
pub use executor::{JobExecutor, JobOutcome, JobResult, StepPlan, StepResult, StepStatus};
pub use gate::{resolve_toolchain_label, StepGate};
pub use matrix::{JobConfig, MatrixExpander};
pub use runner::{MatrixRunner, PlannedStep, RunSummary};
pub use template::{CommandTemplate, Placeholder};
