// Runner Configuration
// Process-wide values threaded through to command resolution

use crate::workflow::Workflow;

use indexmap::IndexMap;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable the access token is exported as
pub const ACCESS_TOKEN_ENV: &str = "ACCESS_TOKEN";

/// Immutable configuration for a matrix run.
///
/// Built once at startup from the workflow declaration and any command-line
/// overrides, then shared read-only by every job.
#[derive(Clone)]
pub struct RunnerConfig {
    /// Toolchain identifier used by jobs on the pinned toolchain
    pub pinned_toolchain: String,
    /// Toolchain label used by every other job
    pub stable_toolchain: String,
    /// Token for external reporting, exported to steps and masked in output
    pub access_token: Option<String>,
    /// Environment exported to every step process
    pub env: IndexMap<String, String>,
    /// Directory steps run in
    pub working_dir: PathBuf,
}

impl RunnerConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            pinned_toolchain: "nightly".to_string(),
            stable_toolchain: "stable".to_string(),
            access_token: None,
            env: IndexMap::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Seed the configuration from a workflow's `env` and `toolchain` blocks
    pub fn from_workflow(workflow: &Workflow, working_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(working_dir);
        config.env = workflow.env.clone();

        if let Some(toolchain) = &workflow.toolchain {
            config.pinned_toolchain = toolchain
                .version
                .clone()
                .unwrap_or_else(|| toolchain.pinned.clone());
            config.stable_toolchain = toolchain.stable.clone();
        }

        config
    }

    /// Override the pinned toolchain identifier
    pub fn with_pinned_toolchain(mut self, toolchain: impl Into<String>) -> Self {
        self.pinned_toolchain = toolchain.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set or replace an environment variable
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Environment for a step process: workflow env, then step env, then the token
    pub fn process_env(&self, step_env: &IndexMap<String, String>) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = self
            .env
            .iter()
            .chain(step_env.iter())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(token) = &self.access_token {
            env.insert(ACCESS_TOKEN_ENV.to_string(), token.clone());
        }

        env
    }

    /// Directory for a step, honouring a relative `working-directory`
    pub fn step_dir(&self, working_directory: Option<&str>) -> PathBuf {
        match working_directory {
            Some(dir) if Path::new(dir).is_absolute() => PathBuf::from(dir),
            Some(dir) => self.working_dir.join(dir),
            None => self.working_dir.clone(),
        }
    }

    /// Replace every occurrence of the access token with `***`
    pub fn mask_secrets(&self, text: &str) -> String {
        match &self.access_token {
            Some(token) if !token.is_empty() => text.replace(token.as_str(), "***"),
            _ => text.to_string(),
        }
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("pinned_toolchain", &self.pinned_toolchain)
            .field("stable_toolchain", &self.stable_toolchain)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("env", &self.env)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowParser;

    #[test]
    fn test_from_workflow_uses_pinned_version() {
        let workflow = WorkflowParser::parse(
            r#"
env:
  CARGO_TERM_COLOR: always
toolchain:
  version: nightly-2024-05-01
matrix:
  toolchain: [stable, nightly]
steps:
  - name: Build
    run: cargo build
"#,
        )
        .unwrap();

        let config = RunnerConfig::from_workflow(&workflow, "/work");

        assert_eq!(config.pinned_toolchain, "nightly-2024-05-01");
        assert_eq!(config.stable_toolchain, "stable");
        assert_eq!(config.env.get("CARGO_TERM_COLOR").unwrap(), "always");
    }

    #[test]
    fn test_pinned_falls_back_to_axis_value() {
        let workflow = WorkflowParser::parse(
            r#"
toolchain:
  pinned: beta
matrix:
  toolchain: [stable, beta]
steps:
  - name: Build
    run: cargo build
"#,
        )
        .unwrap();

        let config = RunnerConfig::from_workflow(&workflow, "/work");
        assert_eq!(config.pinned_toolchain, "beta");
    }

    #[test]
    fn test_process_env_layers() {
        let config = RunnerConfig::new("/work")
            .with_env("A", "workflow")
            .with_env("B", "workflow")
            .with_access_token("s3cret");

        let mut step_env = IndexMap::new();
        step_env.insert("B".to_string(), "step".to_string());

        let env = config.process_env(&step_env);

        assert_eq!(env.get("A").unwrap(), "workflow");
        assert_eq!(env.get("B").unwrap(), "step");
        assert_eq!(env.get(ACCESS_TOKEN_ENV).unwrap(), "s3cret");
    }

    #[test]
    fn test_step_dir() {
        let config = RunnerConfig::new("/work");
        assert_eq!(config.step_dir(None), PathBuf::from("/work"));
        assert_eq!(config.step_dir(Some("crate")), PathBuf::from("/work/crate"));
        assert_eq!(config.step_dir(Some("/tmp")), PathBuf::from("/tmp"));
    }

    #[test]
    fn test_token_is_masked() {
        let config = RunnerConfig::new("/work").with_access_token("s3cret");

        assert_eq!(config.mask_secrets("curl -H 'token: s3cret'"), "curl -H 'token: ***'");
        assert!(!format!("{:?}", config).contains("s3cret"));
    }
}
