pub mod matrix;
pub mod run;
pub mod validate;

use crate::output;

use std::path::{Path, PathBuf};

use clap::Args;
use color_eyre::Result;

use matrix_service::{RunnerConfig, ServiceError, TriggerEvent, Workflow, WorkflowParser};

/// Process-wide settings shared by `run` and `matrix`
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Pinned toolchain identifier (overrides `toolchain.version`)
    #[arg(long, env = "MATRIX_PINNED_TOOLCHAIN", value_name = "TOOLCHAIN")]
    pub pinned_toolchain: Option<String>,

    /// Access token exported to steps as ACCESS_TOKEN
    #[arg(long, env = "MATRIX_ACCESS_TOKEN", hide_env_values = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Set an environment variable for every step (repeatable, format: NAME=VALUE)
    #[arg(long = "env", value_name = "NAME=VALUE")]
    pub env: Vec<String>,

    /// Working directory for step execution
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,
}

impl ConfigArgs {
    /// Build the immutable runner configuration from the workflow and overrides
    pub fn build(&self, workflow: &Workflow) -> Result<RunnerConfig> {
        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let mut config = RunnerConfig::from_workflow(workflow, working_dir);

        for var in &self.env {
            match var.split_once('=') {
                Some((name, value)) => config = config.with_env(name, value),
                None => color_eyre::eyre::bail!(
                    "Invalid environment format '{}'. Expected NAME=VALUE",
                    var
                ),
            }
        }

        if let Some(toolchain) = &self.pinned_toolchain {
            config = config.with_pinned_toolchain(toolchain.clone());
        }
        if let Some(token) = &self.token {
            config = config.with_access_token(token.clone());
        }

        tracing::debug!(?config, "runner configuration");
        Ok(config)
    }
}

/// Parse a trigger event name from the command line
pub fn parse_event(event: &str) -> Result<TriggerEvent> {
    event
        .parse()
        .map_err(|e: String| color_eyre::eyre::eyre!("{}", e))
}

/// Load a workflow file, exiting with status 2 on configuration problems
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    if !path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", path.display());
    }

    match WorkflowParser::from_file(path) {
        Ok(workflow) => Ok(workflow),
        Err(ServiceError::Yaml(e)) => {
            output::error(&format!("Parse error: {}", e));
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

/// Report a configuration error and exit with status 2
pub fn configuration_failure(error: &ServiceError) -> ! {
    output::error(&error.to_string());
    std::process::exit(2);
}
