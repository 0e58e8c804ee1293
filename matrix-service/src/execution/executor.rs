// Job Executor
// Runs a job's applicable steps in order, stopping at the first failure

use crate::config::RunnerConfig;
use crate::error::ConfigurationError;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::gate::StepGate;
use crate::execution::matrix::JobConfig;
use crate::execution::template::{CommandTemplate, TemplateError};
use crate::runners::{OutputCallback, StepInvocation, StepRunner};
use crate::workflow::models::{Step, TriggerEvent};

use serde::Serialize;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status of a single step within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Gate evaluated to false
    Skipped,
    /// An earlier step failed; the gate was never evaluated
    NotRun,
}

/// Result of a single step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    /// Resolved command with secrets masked, for steps that ran
    pub command: Option<String>,
    pub exit_code: Option<i32>,
    /// Captured stderr of a failed step, secrets masked
    pub error: Option<String>,
    pub duration: Duration,
}

impl StepResult {
    fn without_run(name: &str, status: StepStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            command: None,
            exit_code: None,
            error: None,
            duration: Duration::ZERO,
        }
    }
}

/// Terminal outcome of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failed {
        /// Name of the first failing step
        step: String,
        /// Its exit status; `None` if the command could not be started
        exit_code: Option<i32>,
    },
    /// The job's task died before producing step results
    Aborted { reason: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    pub fn failed_step(&self) -> Option<&str> {
        match self {
            JobOutcome::Failed { step, .. } => Some(step),
            JobOutcome::Success | JobOutcome::Aborted { .. } => None,
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Success => write!(f, "success"),
            JobOutcome::Failed {
                step,
                exit_code: Some(code),
            } => write!(f, "failed at step '{}' (exit code {})", step, code),
            JobOutcome::Failed {
                step,
                exit_code: None,
            } => write!(f, "failed at step '{}' (no exit code)", step),
            JobOutcome::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Outcome of executing all applicable steps for one job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job: JobConfig,
    pub outcome: JobOutcome,
    /// One entry per declared step, in declaration order
    pub steps: Vec<StepResult>,
    pub duration: Duration,
}

impl JobResult {
    /// Result for a job whose task ended without reporting; every step is `NotRun`
    pub fn aborted(job: JobConfig, plan: &StepPlan, reason: impl Into<String>) -> Self {
        Self {
            job,
            outcome: JobOutcome::Aborted {
                reason: reason.into(),
            },
            steps: plan
                .steps()
                .iter()
                .map(|c| StepResult::without_run(&c.step.name, StepStatus::NotRun))
                .collect(),
            duration: Duration::ZERO,
        }
    }

    /// Steps whose command was actually executed
    pub fn executed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Succeeded | StepStatus::Failed))
    }
}

/// A step together with its parsed command template
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub step: Step,
    pub template: CommandTemplate,
}

/// The ordered, immutable step list shared by every job
#[derive(Debug, Clone, Default)]
pub struct StepPlan {
    steps: Vec<CompiledStep>,
}

impl StepPlan {
    /// Parse every step's command template
    pub fn compile(steps: &[Step]) -> Result<Self, ConfigurationError> {
        let steps = steps
            .iter()
            .map(|step| {
                let template = CommandTemplate::parse(&step.run).map_err(|e| match e {
                    TemplateError::Unknown(placeholder) => ConfigurationError::UnknownPlaceholder {
                        step: step.name.clone(),
                        placeholder,
                    },
                    TemplateError::Unterminated => ConfigurationError::UnterminatedPlaceholder {
                        step: step.name.clone(),
                    },
                })?;
                Ok(CompiledStep {
                    step: step.clone(),
                    template,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[CompiledStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Executes the step plan for one job at a time.
///
/// Holds only shared read-only state, so clones can run jobs concurrently.
#[derive(Clone)]
pub struct JobExecutor {
    plan: Arc<StepPlan>,
    config: Arc<RunnerConfig>,
    runner: Arc<dyn StepRunner>,
    event_tx: Option<ProgressSender>,
}

impl JobExecutor {
    pub fn new(plan: Arc<StepPlan>, config: Arc<RunnerConfig>, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            plan,
            config,
            runner,
            event_tx: None,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run every applicable step for `job` in declaration order
    pub async fn run(&self, job: &JobConfig, event: TriggerEvent) -> JobResult {
        let start = Instant::now();
        let job_name = job.name();

        self.event_tx.send_event(ExecutionEvent::job_started(
            job.index,
            &job_name,
            self.plan.len(),
        ));
        tracing::info!(job = %job_name, "job started");

        let mut steps = Vec::with_capacity(self.plan.len());
        let mut failure: Option<(String, Option<i32>)> = None;

        for (step_index, compiled) in self.plan.steps().iter().enumerate() {
            let step = &compiled.step;

            if failure.is_some() {
                steps.push(StepResult::without_run(&step.name, StepStatus::NotRun));
                continue;
            }

            if let Some(reason) = StepGate::skip_reason(step, job, event) {
                tracing::debug!(job = %job_name, step = %step.name, %reason, "step skipped");
                self.event_tx.send_event(ExecutionEvent::step_skipped(
                    job.index,
                    &job_name,
                    &step.name,
                    step_index,
                    reason,
                ));
                steps.push(StepResult::without_run(&step.name, StepStatus::Skipped));
                continue;
            }

            let result = self.execute_step(compiled, step_index, job, &job_name).await;
            if result.status == StepStatus::Failed {
                failure = Some((step.name.clone(), result.exit_code));
            }
            steps.push(result);
        }

        let outcome = match failure {
            Some((step, exit_code)) => JobOutcome::Failed { step, exit_code },
            None => JobOutcome::Success,
        };
        let duration = start.elapsed();

        tracing::info!(job = %job_name, %outcome, "job finished");
        self.event_tx.send_event(ExecutionEvent::job_completed(
            job.index,
            &job_name,
            outcome.clone(),
            duration,
        ));

        JobResult {
            job: job.clone(),
            outcome,
            steps,
            duration,
        }
    }

    /// Resolve and run one applicable step
    async fn execute_step(
        &self,
        compiled: &CompiledStep,
        step_index: usize,
        job: &JobConfig,
        job_name: &str,
    ) -> StepResult {
        let start = Instant::now();
        let step = &compiled.step;
        let display = compiled.template.display(job, &self.config, &step.env);

        self.event_tx.send_event(ExecutionEvent::step_started(
            job.index,
            job_name,
            &step.name,
            step_index,
            &display,
        ));

        let invocation = StepInvocation {
            step_name: step.name.clone(),
            command: compiled.template.resolve(job, &self.config, &step.env),
            shell: step.shell.unwrap_or_default(),
            env: self.config.process_env(&step.env),
            working_dir: self.config.step_dir(step.working_directory.as_deref()),
        };

        let output = self
            .runner
            .run(&invocation, self.output_callback(job.index, job_name, step_index))
            .await;

        let status = if output.success() {
            StepStatus::Succeeded
        } else {
            tracing::warn!(
                job = %job_name,
                step = %step.name,
                exit_code = ?output.exit_code,
                "step failed"
            );
            StepStatus::Failed
        };
        let duration = start.elapsed();

        self.event_tx.send_event(ExecutionEvent::step_completed(
            job.index,
            job_name,
            &step.name,
            step_index,
            status,
            duration,
            output.exit_code,
        ));

        StepResult {
            name: step.name.clone(),
            status,
            command: Some(display),
            exit_code: output.exit_code,
            error: if status == StepStatus::Failed && !output.stderr.is_empty() {
                Some(self.config.mask_secrets(&output.stderr))
            } else {
                None
            },
            duration,
        }
    }

    /// Forward output lines to the progress channel with secrets masked
    fn output_callback(&self, job_index: usize, job_name: &str, step_index: usize) -> OutputCallback {
        let tx = self.event_tx.clone();
        let config = self.config.clone();
        let job_name = job_name.to_string();

        Box::new(move |line: &str, is_error: bool| {
            tx.send_event(ExecutionEvent::step_output(
                job_index,
                job_name.clone(),
                step_index,
                config.mask_secrets(line),
                is_error,
            ));
        })
    }
}
