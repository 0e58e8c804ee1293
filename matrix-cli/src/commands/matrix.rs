use crate::commands::{configuration_failure, load_workflow, parse_event, ConfigArgs};
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use serde::Serialize;

use matrix_service::execution::PlannedStep;
use matrix_service::{JobConfig, MatrixRunner, ServiceError};

/// List the jobs a workflow's matrix expands to
#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Also show the gate decision and resolved command of every step
    #[arg(long, short = 's')]
    pub steps: bool,

    /// Triggering event used for gate decisions
    #[arg(long, short = 'e', default_value = "manual")]
    pub event: String,

    /// Print the jobs as JSON on stdout
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Serialize)]
struct PlannedJob<'a> {
    #[serde(flatten)]
    job: &'a JobConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<Vec<PlannedStep>>,
}

pub fn execute(args: MatrixArgs) -> Result<()> {
    let event = parse_event(&args.event)?;
    let workflow = load_workflow(&args.workflow)?;
    let config = args.config.build(&workflow)?;

    let runner = match MatrixRunner::from_workflow(&workflow, config) {
        Ok(runner) => runner,
        Err(e @ ServiceError::Configuration(_)) => configuration_failure(&e),
        Err(e) => return Err(e.into()),
    };
    let jobs = match runner.expand() {
        Ok(jobs) => jobs,
        Err(e) => configuration_failure(&e.into()),
    };

    let planned: Vec<PlannedJob> = jobs
        .iter()
        .map(|job| PlannedJob {
            job,
            steps: args.steps.then(|| runner.dry_run(job, event)),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    output::header(&format!(
        "{}: {} jobs",
        workflow.display_name(),
        planned.len()
    ));

    for entry in &planned {
        println!(
            "{} {} [{}]",
            output::job_tag(entry.job.index),
            entry.job.name(),
            entry.job.toolchain
        );

        let Some(steps) = &entry.steps else { continue };
        for step in steps {
            match (&step.command, &step.skip_reason) {
                (Some(command), _) => {
                    println!("    {}", step.name);
                    output::dim(&format!("      $ {}", command));
                }
                (None, Some(reason)) => {
                    output::dim(&format!("    {} (skipped: {})", step.name, reason));
                }
                (None, None) => {}
            }
        }
    }

    Ok(())
}
