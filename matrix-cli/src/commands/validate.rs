use crate::commands::load_workflow;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use matrix_service::{MatrixExpander, WorkflowParser};

/// Validate a workflow YAML file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let workflow_path = &args.workflow;

    // Step 1: Parse YAML syntax
    output::status("Validating", &format!("{}", workflow_path.display()));
    let workflow = load_workflow(workflow_path)?;
    output::check("YAML syntax valid");

    // Step 2: Structural and semantic checks
    if let Err(e) = WorkflowParser::validate(&workflow) {
        output::error(&e.to_string());
        if let Some(step) = e.step() {
            output::info(&format!("  In step: {}", step));
        }
        std::process::exit(2);
    }

    let axes = workflow.axes()?;
    let jobs = MatrixExpander::job_count(&axes)?;
    let gated = workflow.steps.iter().filter(|s| s.when.is_some()).count();

    output::check(&format!(
        "Matrix: {} axes, {} jobs",
        axes.len(),
        jobs
    ));
    output::check(&format!(
        "Steps: {} ({} gated)",
        workflow.steps.len(),
        gated
    ));
    if let Some(toolchain) = &workflow.toolchain {
        output::check(&format!("Toolchain axis: '{}'", toolchain.axis));
    } else {
        output::warning("No toolchain section: every job uses the stable toolchain");
    }

    println!();
    output::success(&format!("{} is valid", workflow.display_name()));

    Ok(())
}
