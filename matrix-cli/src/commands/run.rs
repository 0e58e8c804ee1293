use crate::commands::{configuration_failure, load_workflow, parse_event, ConfigArgs};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use matrix_service::execution::progress_channel;
use matrix_service::{ExecutionEvent, MatrixRunner, ServiceError, StepStatus};

/// Run every job of a workflow's build matrix locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Triggering event: push, pull_request, schedule, manual
    #[arg(long, short = 'e', default_value = "manual")]
    pub event: String,

    /// Maximum number of jobs to run at once (0 = unlimited; default: workflow's max-parallel)
    #[arg(long, short = 'j', value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Hide step output, show only progress
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let event = parse_event(&args.event)?;

    output::status("Parsing", &format!("{}", args.workflow.display()));
    let workflow = load_workflow(&args.workflow)?;
    let config = args.config.build(&workflow)?;

    let mut runner = match MatrixRunner::from_workflow(&workflow, config) {
        Ok(runner) => runner,
        Err(e @ ServiceError::Configuration(_)) => configuration_failure(&e),
        Err(e) => return Err(e.into()),
    };
    if let Some(max_parallel) = args.max_parallel {
        runner = runner.with_max_parallel(max_parallel);
    }

    let (tx, mut rx) = progress_channel();
    let runner = runner.with_progress(tx);

    // Spawn execution in background
    let exec_handle = tokio::spawn(async move { runner.run(event).await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        print_event(&event, args.quiet, args.json);
    }

    let summary = match exec_handle.await? {
        Ok(summary) => summary,
        Err(e @ ServiceError::Configuration(_)) => configuration_failure(&e),
        Err(e) => return Err(e.into()),
    };

    eprintln!();
    for job in &summary.jobs {
        let line = format!("  {} {}: {}", output::job_tag(job.job.index), job.job.name(), job.outcome);
        if job.outcome.is_success() {
            output::dim_success(&line);
        } else {
            output::dim_failure(&line);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if !summary.success() {
        std::process::exit(1);
    }

    Ok(())
}

/// Where a line of step output is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepStream {
    Stdout,
    Stderr,
    Hidden,
}

/// Under `--json` stdout carries only the summary document
fn step_stream(is_error: bool, quiet: bool, json: bool) -> StepStream {
    match (quiet, is_error, json) {
        (true, _, _) => StepStream::Hidden,
        (false, true, _) | (false, false, true) => StepStream::Stderr,
        (false, false, false) => StepStream::Stdout,
    }
}

fn print_event(event: &ExecutionEvent, quiet: bool, json: bool) {
    match event {
        ExecutionEvent::RunStarted {
            workflow_name,
            event,
            total_jobs,
        } => {
            eprintln!();
            output::header(&format!(
                "Workflow '{}' on {} ({} jobs)",
                workflow_name, event, total_jobs
            ));
        }

        ExecutionEvent::RunCompleted {
            success,
            total_jobs,
            failed_jobs,
            duration,
        } => {
            eprintln!();
            if *success {
                output::success(&format!(
                    "{} jobs succeeded in {:.2}s",
                    total_jobs,
                    duration.as_secs_f64()
                ));
            } else {
                output::failure(&format!(
                    "{} of {} jobs failed after {:.2}s",
                    failed_jobs,
                    total_jobs,
                    duration.as_secs_f64()
                ));
            }
        }

        ExecutionEvent::JobStarted {
            job_index,
            job_name,
            total_steps,
        } => {
            output::job_header(*job_index, job_name, *total_steps);
        }

        ExecutionEvent::JobCompleted {
            job_index,
            outcome,
            duration,
            ..
        } => {
            let line = format!(
                "{} {} ({:.2}s)",
                output::job_tag(*job_index),
                if outcome.is_success() { "OK" } else { "FAIL" },
                duration.as_secs_f64()
            );
            if outcome.is_success() {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }
        }

        ExecutionEvent::StepStarted {
            job_index,
            step_name,
            step_index,
            command,
            ..
        } => {
            eprintln!(
                "{}   [Step {}] {}",
                output::job_tag(*job_index),
                step_index + 1,
                step_name
            );
            output::dim(&format!("{}     $ {}", output::job_tag(*job_index), command));
        }

        ExecutionEvent::StepOutput {
            job_index,
            output: line,
            is_error,
            ..
        } => {
            match step_stream(*is_error, quiet, json) {
                StepStream::Stdout => output::step_output(*job_index, line),
                StepStream::Stderr if *is_error => output::step_error(*job_index, line),
                StepStream::Stderr => output::step_log(*job_index, line),
                StepStream::Hidden => {}
            }
        }

        ExecutionEvent::StepCompleted {
            job_index,
            status,
            duration,
            exit_code,
            ..
        } => {
            let exit_info = match exit_code {
                Some(code) if *code != 0 => format!(" (exit code: {})", code),
                None if *status == StepStatus::Failed => " (not started)".to_string(),
                _ => String::new(),
            };
            let line = format!(
                "{}     {} ({:.2}s){}",
                output::job_tag(*job_index),
                if *status == StepStatus::Succeeded { "OK" } else { "FAIL" },
                duration.as_secs_f64(),
                exit_info,
            );
            if *status == StepStatus::Succeeded {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }
        }

        ExecutionEvent::StepSkipped {
            job_index,
            step_name,
            reason,
            ..
        } => {
            output::dim(&format!(
                "{}   {} skipped: {}",
                output::job_tag(*job_index),
                step_name,
                reason
            ));
        }
    }
}
