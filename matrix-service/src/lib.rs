// Matrix Service Library
// Build-matrix expansion, step gating and job execution for matrix-runner

pub mod config;
pub mod error;
pub mod execution;
pub mod runners;
pub mod workflow;

// Re-export commonly used types
pub use config::RunnerConfig;
pub use error::{ConfigurationError, ServiceError, ServiceResult};

// Re-export workflow types
pub use workflow::{Axis, Gate, Step, ToolchainSelection, TriggerEvent, Workflow, WorkflowParser};

// Re-export execution types
pub use execution::{
    ExecutionEvent, JobConfig, JobOutcome, JobResult, MatrixExpander, MatrixRunner, ProgressSender,
    RunSummary, StepGate, StepStatus,
};

// Re-export runner types
pub use runners::{ShellRunner, StepRunner};
