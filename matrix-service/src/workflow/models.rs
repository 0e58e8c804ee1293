use crate::error::ConfigurationError;
use crate::runners::shell::Shell;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// A build-matrix workflow declaration.
///
/// This is the top-level structure of a workflow YAML file. It is read once at
/// startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Display name of the workflow
    #[serde(default)]
    pub name: Option<String>,

    /// Workflow-level environment, exported to every step process
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Which matrix axis selects between the stable and the pinned toolchain
    #[serde(default)]
    pub toolchain: Option<ToolchainAxis>,

    /// Maximum number of jobs to run at the same time; 0 means unbounded
    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<usize>,

    /// Matrix axes in declaration order (axis name -> values)
    #[serde(default)]
    pub matrix: IndexMap<String, Vec<serde_yaml::Value>>,

    /// Steps every job runs, in declaration order
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Convert the raw matrix mapping into typed axes.
    ///
    /// Scalar values are stringified (`2` becomes `"2"`, `null` becomes
    /// `""`); sequences and mappings are rejected. YAML reads `1.70` as the
    /// float 1.7, so version-like values must be quoted (`"1.70"`); a
    /// non-integer number logs a warning.
    pub fn axes(&self) -> Result<Vec<Axis>, ConfigurationError> {
        self.matrix
            .iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .map(|value| {
                        if let serde_yaml::Value::Number(n) = value {
                            if n.is_f64() {
                                tracing::warn!(
                                    axis = %name,
                                    value = %n,
                                    "float axis value; quote it to keep its exact spelling"
                                );
                            }
                        }
                        scalar_to_string(value).ok_or_else(|| {
                            ConfigurationError::NonScalarAxisValue { axis: name.clone() }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Axis::new(name.clone(), values))
            })
            .collect()
    }

    /// Display name, falling back to "workflow"
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }
}

/// Stringify a YAML scalar
fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_)
        | serde_yaml::Value::Tagged(_) => None,
    }
}

/// A named matrix dimension with its ordered values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<String>,
}

impl Axis {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build an axis from string slices
    pub fn of(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(name, values.iter().map(|v| v.to_string()).collect())
    }
}

/// Toolchain selection settings.
///
/// Jobs whose value on `axis` equals `pinned` use the pinned alternate
/// toolchain; every other job uses the stable one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainAxis {
    /// Matrix axis that carries the toolchain choice
    #[serde(default = "default_toolchain_axis")]
    pub axis: String,

    /// Axis value that selects the pinned toolchain
    #[serde(default = "default_pinned_value")]
    pub pinned: String,

    /// Pinned toolchain identifier (e.g. `nightly-2024-05-01`)
    #[serde(default)]
    pub version: Option<String>,

    /// Label used for the default toolchain
    #[serde(default = "default_stable_label")]
    pub stable: String,
}

impl Default for ToolchainAxis {
    fn default() -> Self {
        Self {
            axis: default_toolchain_axis(),
            pinned: default_pinned_value(),
            version: None,
            stable: default_stable_label(),
        }
    }
}

fn default_toolchain_axis() -> String {
    "toolchain".to_string()
}

fn default_pinned_value() -> String {
    "nightly".to_string()
}

fn default_stable_label() -> String {
    "stable".to_string()
}

/// Which toolchain a job runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainSelection {
    Stable,
    Pinned,
}

impl fmt::Display for ToolchainSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainSelection::Stable => write!(f, "stable"),
            ToolchainSelection::Pinned => write!(f, "pinned"),
        }
    }
}

/// The event that triggered a run.
///
/// The runner treats this as an opaque input; only step gates that name
/// events branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Push,
    #[serde(alias = "pull-request")]
    PullRequest,
    Schedule,
    #[serde(alias = "workflow_dispatch")]
    Manual,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::Push => "push",
            TriggerEvent::PullRequest => "pull_request",
            TriggerEvent::Schedule => "schedule",
            TriggerEvent::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" => Ok(TriggerEvent::Push),
            "pull_request" | "pull-request" | "pr" => Ok(TriggerEvent::PullRequest),
            "schedule" => Ok(TriggerEvent::Schedule),
            "manual" | "workflow_dispatch" => Ok(TriggerEvent::Manual),
            other => Err(format!(
                "Unknown trigger event '{}'. Expected one of: push, pull_request, schedule, manual",
                other
            )),
        }
    }
}

/// One step of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step name, unique within the workflow
    pub name: String,

    /// Command template with `${{ ... }}` placeholders
    pub run: String,

    /// Applicability gate; an absent gate always applies
    #[serde(default)]
    pub when: Option<Gate>,

    /// Shell used to run the command (defaults to `sh`)
    #[serde(default)]
    pub shell: Option<Shell>,

    /// Step-level environment, layered over the workflow environment for both
    /// the process and `${{ env.X }}` placeholders
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Working directory relative to the run's working directory
    #[serde(default, rename = "working-directory")]
    pub working_directory: Option<String>,
}

impl Step {
    /// Create an ungated step
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
            when: None,
            shell: None,
            env: IndexMap::new(),
            working_directory: None,
        }
    }

    /// Attach a gate
    pub fn gated(mut self, gate: Gate) -> Self {
        self.when = Some(gate);
        self
    }
}

/// Applicability conditions for a step. Every present condition must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    /// Run only for jobs with this toolchain selection
    #[serde(default)]
    pub toolchain: Option<ToolchainSelection>,

    /// Run only for jobs whose axis values equal these
    #[serde(default)]
    pub matrix: IndexMap<String, String>,

    /// Run only for these trigger events (empty = any)
    #[serde(default)]
    pub event: Vec<TriggerEvent>,
}

impl Gate {
    pub fn toolchain(selection: ToolchainSelection) -> Self {
        Self {
            toolchain: Some(selection),
            ..Default::default()
        }
    }

    pub fn axis_equals(axis: impl Into<String>, value: impl Into<String>) -> Self {
        let mut matrix = IndexMap::new();
        matrix.insert(axis.into(), value.into());
        Self {
            matrix,
            ..Default::default()
        }
    }

    pub fn events(events: &[TriggerEvent]) -> Self {
        Self {
            event: events.to_vec(),
            ..Default::default()
        }
    }
}
