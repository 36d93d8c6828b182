/// Job Controller - One State Machine per Compile-and-Run Request
///
/// **States:**
/// ```text
/// Queued        --admitted-->           Preparing
/// Preparing     --workspace acquired--> Compiling
/// Preparing     --acquire failed-->     Aborted
/// Compiling     --compiler exit 0-->    Running
/// Compiling     --compiler exit != 0--> CompileFailed
/// Compiling     --deadline exceeded-->  TimedOut
/// Running       --process exit 0-->     Completed
/// Running       --process exit != 0-->  RunFailed
/// Running       --deadline exceeded-->  TimedOut
/// (any non-terminal) --internal error-> Aborted
/// ```
///
/// The controller is the only writer of a job's state and buffers; no
/// other task observes them before a terminal state. Every terminal
/// transition releases the workspace exactly once, before the reporter
/// ever sees the job, and a job whose deadline has already passed is
/// short-circuited to TimedOut instead of entering Compiling or Running.
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crucible_common::types::ErrorKind;

use crate::toolchain::{ProcessOutput, Toolchain, ToolchainError, WaitOutcome};
use crate::workspace::WorkspaceManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Preparing,
    Compiling,
    CompileFailed,
    Running,
    Completed,
    RunFailed,
    TimedOut,
    Aborted,
}

impl JobState {
    /// Terminal states are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::CompileFailed
                | JobState::Completed
                | JobState::RunFailed
                | JobState::TimedOut
                | JobState::Aborted
        )
    }
}

/// The unit of work for one request. Mutated only by the controller task
/// handling it; consumers read it after it reaches a terminal state.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub state: JobState,
    pub compile: Option<ProcessOutput>,
    pub run: Option<ProcessOutput>,
    /// Set for operational faults (Aborted with a cause); expected
    /// outcomes are derivable from `state` alone.
    pub fault: Option<ErrorKind>,
}

impl Job {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Queued,
            compile: None,
            run: None,
            fault: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobController {
    workspaces: WorkspaceManager,
    toolchain: Toolchain,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl JobController {
    pub fn new(
        workspaces: WorkspaceManager,
        toolchain: Toolchain,
        compile_timeout: Duration,
        run_timeout: Duration,
    ) -> Self {
        Self {
            workspaces,
            toolchain,
            compile_timeout,
            run_timeout,
        }
    }

    /// Drive one admitted request to a terminal state.
    ///
    /// The workspace is acquired here and released on every path: normal
    /// completion releases it explicitly before returning, and the
    /// workspace's drop guard covers panic or task cancellation.
    pub async fn execute(&self, source_text: &str) -> Job {
        self.execute_from(source_text, Instant::now()).await
    }

    /// Like `execute`, with an explicit admission instant. The deadline is
    /// anchored to admission, so time spent queued or preparing counts
    /// against it.
    pub async fn execute_from(&self, source_text: &str, started_at: Instant) -> Job {
        let mut job = Job::new();
        job.state = JobState::Preparing;
        debug!(job_id = %job.id, "Job admitted, preparing workspace");

        let workspace = match self.workspaces.acquire(job.id) {
            Ok(workspace) => workspace,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "Workspace acquisition failed");
                job.state = JobState::Aborted;
                job.fault = Some(ErrorKind::Resource);
                return job;
            }
        };

        self.drive(&mut job, source_text, workspace.path(), started_at).await;
        debug_assert!(job.state.is_terminal());

        // Unconditional, exactly once, before any reporting.
        workspace.release();
        info!(job_id = %job.id, state = ?job.state, elapsed_ms = started_at.elapsed().as_millis() as u64, "Job finished");
        job
    }

    /// Compile without executing anything; used by tooling that only
    /// wants diagnostics. A clean compile terminates as Completed.
    pub async fn compile_only(&self, source_text: &str) -> Job {
        let mut job = Job::new();
        let started_at = Instant::now();
        job.state = JobState::Preparing;

        let workspace = match self.workspaces.acquire(job.id) {
            Ok(workspace) => workspace,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "Workspace acquisition failed");
                job.state = JobState::Aborted;
                job.fault = Some(ErrorKind::Resource);
                return job;
            }
        };

        let compile_deadline = started_at + self.compile_timeout;
        if Instant::now() >= compile_deadline {
            job.state = JobState::TimedOut;
        } else if self
            .compile_step(&mut job, source_text, workspace.path(), compile_deadline)
            .await
        {
            job.state = JobState::Completed;
        }

        workspace.release();
        job
    }

    async fn drive(
        &self,
        job: &mut Job,
        source_text: &str,
        workspace: &std::path::Path,
        started_at: Instant,
    ) {
        let compile_deadline = started_at + self.compile_timeout;
        let deadline = compile_deadline + self.run_timeout;

        // A job that has already outlived its deadline never reaches the
        // toolchain.
        if Instant::now() >= compile_deadline {
            job.state = JobState::TimedOut;
            return;
        }

        if !self.compile_step(job, source_text, workspace, compile_deadline).await {
            return;
        }

        if Instant::now() >= deadline {
            job.state = JobState::TimedOut;
            return;
        }

        job.state = JobState::Running;
        debug!(job_id = %job.id, "Running compiled artifact");
        match self.toolchain.run(workspace, deadline).await {
            Ok(WaitOutcome::Exited(output)) => {
                let exit_code = output.exit_code;
                job.run = Some(output);
                job.state = if exit_code == Some(0) {
                    JobState::Completed
                } else {
                    JobState::RunFailed
                };
            }
            Ok(WaitOutcome::DeadlineExceeded(partial)) => {
                job.run = Some(partial);
                job.state = JobState::TimedOut;
            }
            Err(ToolchainError::Unavailable(err)) => {
                warn!(job_id = %job.id, error = %err, "Artifact unspawnable");
                job.state = JobState::Aborted;
                job.fault = Some(ErrorKind::ToolchainUnavailable);
            }
            Err(ToolchainError::Io(err)) => {
                warn!(job_id = %job.id, error = %err, "Run phase i/o failure");
                job.state = JobState::Aborted;
                job.fault = Some(ErrorKind::Resource);
            }
        }
    }

    /// Run exactly one compiler process. Returns true when it exited 0;
    /// otherwise the terminal state is already set on the job.
    async fn compile_step(
        &self,
        job: &mut Job,
        source_text: &str,
        workspace: &std::path::Path,
        deadline: Instant,
    ) -> bool {
        job.state = JobState::Compiling;
        debug!(job_id = %job.id, "Compiling");
        match self.toolchain.compile(source_text, workspace, deadline).await {
            Ok(WaitOutcome::Exited(output)) => {
                let exit_code = output.exit_code;
                job.compile = Some(output);
                if exit_code == Some(0) {
                    true
                } else {
                    job.state = JobState::CompileFailed;
                    false
                }
            }
            Ok(WaitOutcome::DeadlineExceeded(partial)) => {
                job.compile = Some(partial);
                job.state = JobState::TimedOut;
                false
            }
            Err(ToolchainError::Unavailable(err)) => {
                warn!(job_id = %job.id, error = %err, "Compiler unspawnable");
                job.state = JobState::Aborted;
                job.fault = Some(ErrorKind::ToolchainUnavailable);
                false
            }
            Err(ToolchainError::Io(err)) => {
                warn!(job_id = %job.id, error = %err, "Compile phase i/o failure");
                job.state = JobState::Aborted;
                job.fault = Some(ErrorKind::Resource);
                false
            }
        }
    }
}
