// Step Gates
// Decides per job and trigger whether a step applies

use crate::config::RunnerConfig;
use crate::execution::matrix::JobConfig;
use crate::workflow::models::{Gate, Step, ToolchainSelection, TriggerEvent};

/// Step gate evaluator
pub struct StepGate;

impl StepGate {
    /// Whether `step` should run for `job` under `event`
    pub fn is_applicable(step: &Step, job: &JobConfig, event: TriggerEvent) -> bool {
        Self::skip_reason(step, job, event).is_none()
    }

    /// Why `step` does not apply, or `None` when it does
    pub fn skip_reason(step: &Step, job: &JobConfig, event: TriggerEvent) -> Option<String> {
        step.when
            .as_ref()
            .and_then(|gate| Self::check(gate, job, event).err())
    }

    /// Evaluate every condition of a gate; the first unmet one is reported
    fn check(gate: &Gate, job: &JobConfig, event: TriggerEvent) -> Result<(), String> {
        if let Some(required) = gate.toolchain {
            if job.toolchain != required {
                return Err(format!(
                    "requires {} toolchain, job uses {}",
                    required, job.toolchain
                ));
            }
        }

        for (axis, required) in &gate.matrix {
            match job.value(axis) {
                Some(actual) if actual == required.as_str() => {}
                Some(actual) => {
                    return Err(format!(
                        "requires {}='{}', job has {}='{}'",
                        axis, required, axis, actual
                    ));
                }
                None => return Err(format!("requires {}='{}', job has no {}", axis, required, axis)),
            }
        }

        if !gate.event.is_empty() && !gate.event.contains(&event) {
            let allowed: Vec<&str> = gate.event.iter().map(TriggerEvent::as_str).collect();
            return Err(format!(
                "runs on [{}], triggered by {}",
                allowed.join(", "),
                event
            ));
        }

        Ok(())
    }
}

/// Toolchain string for a job.
///
/// This is the only place that chooses between the pinned and the stable
/// toolchain; every command template goes through it.
pub fn resolve_toolchain_label<'a>(job: &JobConfig, config: &'a RunnerConfig) -> &'a str {
    match job.toolchain {
        ToolchainSelection::Pinned => config.pinned_toolchain.as_str(),
        ToolchainSelection::Stable => config.stable_toolchain.as_str(),
    }
}
