// Runners Module
// Executes resolved step commands

pub mod shell;

pub use shell::{Shell, ShellRunner, StepOutput};

use std::collections::HashMap;
use std::path::PathBuf;

/// Callback for streaming output lines: `(line, is_stderr)`
pub type OutputCallback = Box<dyn Fn(&str, bool) + Send + Sync>;

/// Everything a runner needs to execute one step
#[derive(Debug, Clone)]
pub struct StepInvocation {
    /// Step name, for diagnostics
    pub step_name: String,
    /// Fully resolved command
    pub command: String,
    pub shell: Shell,
    pub env: HashMap<String, String>,
    pub working_dir: PathBuf,
}

/// Trait for step runners
#[async_trait::async_trait]
pub trait StepRunner: Send + Sync {
    /// Execute a resolved step command and report how it exited
    async fn run(&self, invocation: &StepInvocation, on_output: OutputCallback) -> StepOutput;
}

#[async_trait::async_trait]
impl StepRunner for ShellRunner {
    async fn run(&self, invocation: &StepInvocation, on_output: OutputCallback) -> StepOutput {
        self.run_streaming(
            invocation.shell,
            &invocation.command,
            &invocation.env,
            &invocation.working_dir,
            on_output,
        )
        .await
    }
}
