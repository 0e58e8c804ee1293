// Shell Runner
// Executes step commands through sh, bash or pwsh

use crate::runners::OutputCallback;

use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Shell types supported by the runner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    /// `sh` on Unix, `cmd` on Windows
    #[default]
    #[serde(alias = "default")]
    Sh,
    Bash,
    /// PowerShell Core
    Pwsh,
}

impl Shell {
    /// Get the shell executable and arguments
    fn get_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Sh => {
                if cfg!(target_os = "windows") {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            Shell::Bash => ("bash", &["-c"]),
            Shell::Pwsh => ("pwsh", &["-NoLogo", "-NoProfile", "-Command"]),
        }
    }
}

/// Output collected during command execution
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the process could not be spawned or was killed by a signal
    pub exit_code: Option<i32>,
}

impl StepOutput {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    /// Zero exit status
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Shell runner for executing step commands
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    /// Execute a command and collect its output
    pub async fn run_command(
        &self,
        shell: Shell,
        command: &str,
        env: &HashMap<String, String>,
        working_dir: &Path,
    ) -> StepOutput {
        self.run_streaming(shell, command, env, working_dir, Box::new(|_: &str, _: bool| {}))
            .await
    }

    /// Execute a command, streaming each output line to `on_output` as it arrives
    pub async fn run_streaming(
        &self,
        shell: Shell,
        command: &str,
        env: &HashMap<String, String>,
        working_dir: &Path,
        on_output: OutputCallback,
    ) -> StepOutput {
        let (shell_cmd, shell_args) = shell.get_command();

        let mut cmd = Command::new(shell_cmd);
        cmd.args(shell_args);
        cmd.arg(command);
        cmd.current_dir(working_dir);
        cmd.envs(env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(shell = shell_cmd, error = %e, "failed to spawn shell");
                return StepOutput {
                    stderr: format!("Failed to spawn shell process '{}': {}", shell_cmd, e),
                    ..Default::default()
                };
            }
        };

        let on_output = Arc::new(on_output);
        let stdout_handle = child
            .stdout
            .take()
            .map(|stdout| collect_lines(stdout, on_output.clone(), false));
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| collect_lines(stderr, on_output, true));

        let exit_code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(shell = shell_cmd, error = %e, "failed to wait for shell");
                None
            }
        };

        StepOutput {
            stdout: join_output(stdout_handle).await,
            stderr: join_output(stderr_handle).await,
            exit_code,
        }
    }
}

/// Read a stream line by line, forwarding each line and accumulating the text
fn collect_lines<R>(
    stream: R,
    on_output: Arc<OutputCallback>,
    is_error: bool,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut output = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            on_output(&line, is_error);
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&line);
        }
        output
    })
}

async fn join_output(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
