// Matrix Runner
// Expands the matrix and runs every job concurrently

use crate::config::RunnerConfig;
use crate::error::{ConfigurationError, ServiceError, ServiceResult};
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::executor::{JobExecutor, JobResult, StepPlan};
use crate::execution::gate::StepGate;
use crate::execution::matrix::{JobConfig, MatrixExpander};
use crate::runners::{ShellRunner, StepRunner};
use crate::workflow::models::{Axis, ToolchainAxis, TriggerEvent, Workflow};
use crate::workflow::WorkflowParser;

use serde::Serialize;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Results of a whole matrix run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub workflow_name: String,
    pub event: TriggerEvent,
    /// One result per job, in expansion order
    pub jobs: Vec<JobResult>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.jobs.iter().all(|j| j.outcome.is_success())
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.jobs.iter().filter(|j| !j.outcome.is_success())
    }
}

/// A step as it would run for one job, without running it
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub name: String,
    /// Resolved command with secrets masked; `None` when the gate excludes the step
    pub command: Option<String>,
    pub skip_reason: Option<String>,
}

/// Runs a validated workflow's matrix.
pub struct MatrixRunner {
    workflow_name: String,
    axes: Vec<Axis>,
    toolchain: Option<ToolchainAxis>,
    max_parallel: Option<usize>,
    plan: Arc<StepPlan>,
    config: Arc<RunnerConfig>,
    runner: Arc<dyn StepRunner>,
    event_tx: Option<ProgressSender>,
}

impl MatrixRunner {
    /// Validate the workflow and prepare its step plan.
    ///
    /// Jobs run through the shell runner unless another runner is supplied.
    pub fn from_workflow(workflow: &Workflow, config: RunnerConfig) -> ServiceResult<Self> {
        WorkflowParser::validate(workflow)?;

        Ok(Self {
            workflow_name: workflow.display_name().to_string(),
            axes: workflow.axes()?,
            toolchain: workflow.toolchain.clone(),
            max_parallel: workflow.max_parallel.filter(|&n| n > 0),
            plan: Arc::new(StepPlan::compile(&workflow.steps)?),
            config: Arc::new(config),
            runner: Arc::new(ShellRunner::new()),
            event_tx: None,
        })
    }

    /// Use a different step runner
    pub fn with_runner(mut self, runner: Arc<dyn StepRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Override the workflow's `max-parallel`; 0 removes the bound
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = (max_parallel > 0).then_some(max_parallel);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn plan(&self) -> &StepPlan {
        &self.plan
    }

    /// Expand the matrix into job configurations
    pub fn expand(&self) -> Result<Vec<JobConfig>, ConfigurationError> {
        MatrixExpander::expand(&self.axes, self.toolchain.as_ref())
    }

    /// Gate decisions and resolved commands for one job, without executing anything
    pub fn dry_run(&self, job: &JobConfig, event: TriggerEvent) -> Vec<PlannedStep> {
        self.plan
            .steps()
            .iter()
            .map(|compiled| {
                let skip_reason = StepGate::skip_reason(&compiled.step, job, event);
                PlannedStep {
                    name: compiled.step.name.clone(),
                    command: skip_reason
                        .is_none()
                        .then(|| {
                            compiled
                                .template
                                .display(job, &self.config, &compiled.step.env)
                        }),
                    skip_reason,
                }
            })
            .collect()
    }

    /// Expand the matrix and run every job.
    ///
    /// A configuration error aborts before any job starts. Step failures are
    /// recorded in the failing job's result and never affect other jobs.
    pub async fn run(&self, event: TriggerEvent) -> ServiceResult<RunSummary> {
        let start = Instant::now();
        let jobs = self.expand()?;
        let total_jobs = jobs.len();

        tracing::info!(
            workflow = %self.workflow_name,
            %event,
            jobs = total_jobs,
            max_parallel = ?self.max_parallel,
            "starting matrix run"
        );
        self.event_tx.send_event(ExecutionEvent::run_started(
            &self.workflow_name,
            event,
            total_jobs,
        ));

        let semaphore = self.max_parallel.map(|n| Arc::new(Semaphore::new(n)));
        let mut executor = JobExecutor::new(self.plan.clone(), self.config.clone(), self.runner.clone());
        if let Some(tx) = &self.event_tx {
            executor = executor.with_progress(tx.clone());
        }

        let mut tasks = JoinSet::new();
        for job in jobs {
            let executor = executor.clone();
            let semaphore = semaphore.clone();
            let event_tx = self.event_tx.clone();
            let plan = self.plan.clone();
            tasks.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|e| ServiceError::JobTask(e.to_string()))?,
                    ),
                    None => None,
                };
                // A panicking job is recorded as aborted; siblings keep running
                let index = job.index;
                let name = job.name();
                let task_job = job.clone();
                let handle = tokio::spawn(async move { executor.run(&task_job, event).await });
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(job = %name, error = %e, "job task ended abnormally");
                        let result = JobResult::aborted(job, &plan, e.to_string());
                        event_tx.send_event(ExecutionEvent::job_completed(
                            index,
                            &name,
                            result.outcome.clone(),
                            result.duration,
                        ));
                        result
                    }
                };
                Ok::<_, ServiceError>(result)
            });
        }

        let mut results = Vec::with_capacity(total_jobs);
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| ServiceError::JobTask(e.to_string()))??;
            results.push(result);
        }
        results.sort_by_key(|r| r.job.index);

        let summary = RunSummary {
            workflow_name: self.workflow_name.clone(),
            event,
            jobs: results,
            duration: start.elapsed(),
        };

        let failed = summary.failed_jobs().count();
        tracing::info!(jobs = total_jobs, failed, "matrix run finished");
        self.event_tx.send_event(ExecutionEvent::run_completed(
            failed == 0,
            total_jobs,
            failed,
            summary.duration,
        ));

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::progress_channel;
    use crate::execution::executor::tests::ScriptedRunner;
    use crate::execution::executor::{JobOutcome, StepStatus};
    use crate::runners::{OutputCallback, StepInvocation, StepOutput};

    use std::sync::atomic::{AtomicUsize, Ordering};

    const REFERENCE: &str = r#"
name: CI
toolchain:
  pinned: nightly
  version: nightly-2024-05-01
matrix:
  backend: [rustcrypto, mbedtls, openssl]
  features: ["", alloc, os]
  toolchain: [stable, nightly]
steps:
  - name: Install toolchain
    when: { toolchain: pinned }
    run: rustup toolchain install ${{ toolchain }}
  - name: Format
    run: cargo +${{ toolchain }} fmt -- --check
  - name: Build
    run: cargo +${{ toolchain }} build --features ${{ matrix.backend }},${{ matrix.features }}
  - name: Test
    when:
      matrix: { features: os }
    run: cargo +${{ toolchain }} test --features ${{ matrix.backend }},${{ matrix.features }}
"#;

    fn matrix_runner(runner: Arc<dyn StepRunner>) -> MatrixRunner {
        let workflow = WorkflowParser::parse(REFERENCE).unwrap();
        let config = RunnerConfig::from_workflow(&workflow, "/work");
        MatrixRunner::from_workflow(&workflow, config)
            .unwrap()
            .with_runner(runner)
    }

    #[tokio::test]
    async fn test_reference_run_all_succeed() {
        let runner = Arc::new(ScriptedRunner::succeeding());
        let summary = matrix_runner(runner.clone())
            .run(TriggerEvent::Push)
            .await
            .unwrap();

        assert!(summary.success());
        assert_eq!(summary.jobs.len(), 18);
        for (i, job) in summary.jobs.iter().enumerate() {
            assert_eq!(job.job.index, i);
        }

        // 18 Format + 18 Build + 9 Install + 6 Test
        assert_eq!(runner.calls.lock().unwrap().len(), 51);
    }

    #[tokio::test]
    async fn test_failure_is_local_to_its_job() {
        let runner = Arc::new(ScriptedRunner::failing_when(|inv| {
            (inv.step_name == "Build" && inv.command.contains("openssl,") && inv.command.ends_with(','))
                .then_some(101)
        }));
        let summary = matrix_runner(runner).run(TriggerEvent::Push).await.unwrap();

        let failed: Vec<_> = summary.failed_jobs().map(|j| j.job.name()).collect();
        assert_eq!(
            failed,
            vec![
                "backend=openssl, features=, toolchain=stable",
                "backend=openssl, features=, toolchain=nightly"
            ]
        );

        let pinned = summary
            .jobs
            .iter()
            .find(|j| j.job.name() == "backend=openssl, features=, toolchain=nightly")
            .unwrap();
        assert_eq!(
            pinned.outcome,
            JobOutcome::Failed {
                step: "Build".to_string(),
                exit_code: Some(101)
            }
        );
        assert_eq!(pinned.steps[3].status, StepStatus::NotRun);
        assert_eq!(summary.jobs.iter().filter(|j| j.outcome.is_success()).count(), 16);
    }

    #[tokio::test]
    async fn test_empty_axis_aborts_before_any_job() {
        let mut workflow = WorkflowParser::parse(REFERENCE).unwrap();
        workflow.matrix.insert("features".to_string(), Vec::new());

        let err = MatrixRunner::from_workflow(&workflow, RunnerConfig::new("/work"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ServiceError::Configuration(ConfigurationError::EmptyAxis { .. })
        ));
    }

    #[tokio::test]
    async fn test_max_parallel_bounds_concurrency() {
        struct Tracking {
            active: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl StepRunner for Tracking {
            async fn run(&self, _: &StepInvocation, _: OutputCallback) -> StepOutput {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                StepOutput::exited(0)
            }
        }

        let tracking = Arc::new(Tracking {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let summary = matrix_runner(tracking.clone())
            .with_max_parallel(2)
            .run(TriggerEvent::Schedule)
            .await
            .unwrap();

        assert!(summary.success());
        assert!(tracking.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_run_events_bracket_jobs() {
        let (tx, mut rx) = progress_channel();
        matrix_runner(Arc::new(ScriptedRunner::succeeding()))
            .with_progress(tx)
            .run(TriggerEvent::Manual)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(
            events.first(),
            Some(ExecutionEvent::RunStarted {
                total_jobs: 18,
                event: TriggerEvent::Manual,
                ..
            })
        ));
        assert!(matches!(
            events.last(),
            Some(ExecutionEvent::RunCompleted {
                success: true,
                failed_jobs: 0,
                ..
            })
        ));
        let completed = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::JobCompleted { .. }))
            .count();
        assert_eq!(completed, 18);
    }

    #[test]
    fn test_dry_run() {
        let runner = matrix_runner(Arc::new(ScriptedRunner::succeeding()));
        let jobs = runner.expand().unwrap();

        // index 3: rustcrypto, alloc, nightly
        let plan = runner.dry_run(&jobs[3], TriggerEvent::Push);
        assert_eq!(plan.len(), 4);
        assert_eq!(
            plan[0].command.as_deref(),
            Some("rustup toolchain install nightly-2024-05-01")
        );
        assert_eq!(
            plan[2].command.as_deref(),
            Some("cargo +nightly-2024-05-01 build --features rustcrypto,alloc")
        );
        assert!(plan[3].command.is_none());
        assert_eq!(
            plan[3].skip_reason.as_deref(),
            Some("requires features='os', job has features='alloc'")
        );
    }

    #[tokio::test]
    async fn test_declared_max_parallel_zero_is_unbounded() {
        let yaml = r#"
max-parallel: 0
matrix:
  backend: [rustcrypto, openssl]
steps:
  - name: Build
    run: cargo build --features ${{ matrix.backend }}
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let config = RunnerConfig::from_workflow(&workflow, "/work");
        let runner = MatrixRunner::from_workflow(&workflow, config)
            .unwrap()
            .with_runner(Arc::new(ScriptedRunner::succeeding()));

        let summary = tokio::time::timeout(Duration::from_secs(5), runner.run(TriggerEvent::Push))
            .await
            .expect("run should not wait on an empty semaphore")
            .unwrap();

        assert!(summary.success());
        assert_eq!(summary.jobs.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_abort_siblings() {
        struct PanicsOnMbedtls;

        #[async_trait::async_trait]
        impl StepRunner for PanicsOnMbedtls {
            async fn run(&self, invocation: &StepInvocation, _: OutputCallback) -> StepOutput {
                if invocation.command.contains("mbedtls") {
                    panic!("runner crashed");
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                StepOutput::exited(0)
            }
        }

        let (tx, mut rx) = progress_channel();
        let summary = matrix_runner(Arc::new(PanicsOnMbedtls))
            .with_progress(tx)
            .run(TriggerEvent::Push)
            .await
            .unwrap();

        assert_eq!(summary.jobs.len(), 18);
        for job in &summary.jobs {
            let is_mbedtls = job.job.value("backend") == Some("mbedtls");
            assert_eq!(job.outcome.is_success(), !is_mbedtls, "{}", job.job.name());
            if is_mbedtls {
                assert!(matches!(job.outcome, JobOutcome::Aborted { .. }));
                assert!(job.steps.iter().all(|s| s.status == StepStatus::NotRun));
            }
        }

        let mut completed = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ExecutionEvent::JobCompleted { .. }) {
                completed += 1;
            }
        }
        assert_eq!(completed, 18);
    }
}
