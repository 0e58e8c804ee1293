pub mod models;
pub mod parser;

pub use models::{Axis, Gate, Step, ToolchainAxis, ToolchainSelection, TriggerEvent, Workflow};
pub use parser::WorkflowParser;
