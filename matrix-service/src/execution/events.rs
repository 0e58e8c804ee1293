// Execution Events
// Progress reporting for matrix runs

use crate::execution::executor::{JobOutcome, StepStatus};
use crate::workflow::models::TriggerEvent;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a matrix run.
///
/// Jobs run concurrently, so events from different jobs interleave; every
/// job-scoped event carries the job's expansion index and name.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Matrix expanded, jobs about to start
    RunStarted {
        workflow_name: String,
        event: TriggerEvent,
        total_jobs: usize,
    },

    /// All jobs finished
    RunCompleted {
        success: bool,
        total_jobs: usize,
        failed_jobs: usize,
        duration: Duration,
    },

    /// Job execution started
    JobStarted {
        job_index: usize,
        job_name: String,
        total_steps: usize,
    },

    /// Job execution completed
    JobCompleted {
        job_index: usize,
        job_name: String,
        outcome: JobOutcome,
        duration: Duration,
    },

    /// Step execution started
    StepStarted {
        job_index: usize,
        job_name: String,
        step_name: String,
        step_index: usize,
        /// Resolved command with secrets masked
        command: String,
    },

    /// Step output (stdout/stderr)
    StepOutput {
        job_index: usize,
        job_name: String,
        step_index: usize,
        output: String,
        is_error: bool,
    },

    /// Step execution completed
    StepCompleted {
        job_index: usize,
        job_name: String,
        step_name: String,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    },

    /// Step gate evaluated to false
    StepSkipped {
        job_index: usize,
        job_name: String,
        step_name: String,
        step_index: usize,
        reason: String,
    },
}

impl ExecutionEvent {
    pub fn run_started(
        workflow_name: impl Into<String>,
        event: TriggerEvent,
        total_jobs: usize,
    ) -> Self {
        Self::RunStarted {
            workflow_name: workflow_name.into(),
            event,
            total_jobs,
        }
    }

    pub fn run_completed(
        success: bool,
        total_jobs: usize,
        failed_jobs: usize,
        duration: Duration,
    ) -> Self {
        Self::RunCompleted {
            success,
            total_jobs,
            failed_jobs,
            duration,
        }
    }

    pub fn job_started(job_index: usize, job_name: impl Into<String>, total_steps: usize) -> Self {
        Self::JobStarted {
            job_index,
            job_name: job_name.into(),
            total_steps,
        }
    }

    pub fn job_completed(
        job_index: usize,
        job_name: impl Into<String>,
        outcome: JobOutcome,
        duration: Duration,
    ) -> Self {
        Self::JobCompleted {
            job_index,
            job_name: job_name.into(),
            outcome,
            duration,
        }
    }

    pub fn step_started(
        job_index: usize,
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        command: impl Into<String>,
    ) -> Self {
        Self::StepStarted {
            job_index,
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
            command: command.into(),
        }
    }

    pub fn step_output(
        job_index: usize,
        job_name: impl Into<String>,
        step_index: usize,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::StepOutput {
            job_index,
            job_name: job_name.into(),
            step_index,
            output: output.into(),
            is_error,
        }
    }

    pub fn step_completed(
        job_index: usize,
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::StepCompleted {
            job_index,
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
            status,
            duration,
            exit_code,
        }
    }

    pub fn step_skipped(
        job_index: usize,
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::StepSkipped {
            job_index,
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
            reason: reason.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::run_started("CI", TriggerEvent::Push, 18));
        tx.send_event(ExecutionEvent::job_started(0, "backend=openssl", 5));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            ExecutionEvent::RunStarted { total_jobs: 18, .. }
        ));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(event2, ExecutionEvent::JobStarted { .. }));
    }

    #[test]
    fn test_event_construction() {
        let event = ExecutionEvent::job_completed(
            3,
            "backend=openssl",
            JobOutcome::Failed {
                step: "Build".to_string(),
                exit_code: Some(101),
            },
            Duration::from_secs(30),
        );

        if let ExecutionEvent::JobCompleted {
            job_index,
            job_name,
            outcome,
            duration,
        } = event
        {
            assert_eq!(job_index, 3);
            assert_eq!(job_name, "backend=openssl");
            assert_eq!(outcome.failed_step(), Some("Build"));
            assert_eq!(duration, Duration::from_secs(30));
        } else {
            panic!("wrong event type");
        }
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::run_completed(true, 0, 0, Duration::ZERO));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send_event(ExecutionEvent::job_started(0, "job", 1));
    }
}
