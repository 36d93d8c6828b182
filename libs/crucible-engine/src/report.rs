/// Result Reporter - Terminal Job to Wire Contract
///
/// Pure mapping from a terminal `Job` to the `RunReport` consumed by any
/// client. It reads only the job's state and buffers - never a process
/// handle - so serialization cannot race cleanup.
use crucible_common::types::{ErrorKind, RunReport, Stage};

use crate::job::{Job, JobState};

pub fn report(job: &Job) -> RunReport {
    debug_assert!(job.state.is_terminal());

    // TimedOut and Aborted can strike either phase; attribute them to the
    // last phase that produced output. A clean compile whose run never
    // got to spawn still counts as a run-phase failure, so a client is
    // never told its code failed to compile when it compiled.
    let stage = match job.state {
        JobState::Completed | JobState::RunFailed => Stage::Run,
        JobState::CompileFailed => Stage::Compile,
        _ if job.run.is_some() => Stage::Run,
        _ if matches!(&job.compile, Some(out) if out.exit_code == Some(0)) => Stage::Run,
        _ => Stage::Compile,
    };

    let output = match stage {
        Stage::Compile => job.compile.as_ref(),
        Stage::Run => job.run.as_ref(),
    };

    let error = match job.state {
        JobState::Completed => None,
        JobState::CompileFailed => Some(ErrorKind::CompileFailed),
        JobState::RunFailed => Some(ErrorKind::RunFailed),
        JobState::TimedOut => Some(ErrorKind::TimedOut),
        _ => Some(job.fault.unwrap_or(ErrorKind::Aborted)),
    };

    RunReport {
        job_id: job.id,
        ok: job.state == JobState::Completed,
        stage,
        stdout: output.map(|o| o.stdout_lossy()).unwrap_or_default(),
        stderr: output.map(|o| o.stderr_lossy()).unwrap_or_default(),
        exit_code: output.and_then(|o| o.exit_code),
        truncated: output.map(|o| o.truncated).unwrap_or(false),
        error,
    }
}

/// Report for a request refused before any job existed (gate busy,
/// source over the size cap).
pub fn refused_report(error: ErrorKind, stderr: String) -> RunReport {
    RunReport {
        job_id: uuid::Uuid::new_v4(),
        ok: false,
        stage: Stage::Compile,
        stdout: String::new(),
        stderr,
        exit_code: None,
        truncated: false,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::ProcessOutput;
    use uuid::Uuid;

    fn job(state: JobState) -> Job {
        Job {
            id: Uuid::new_v4(),
            state,
            compile: None,
            run: None,
            fault: None,
        }
    }

    fn output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            truncated: false,
        }
    }

    #[test]
    fn completed_reports_run_stage_and_exit_zero() {
        let mut j = job(JobState::Completed);
        j.compile = Some(output(Some(0), "", ""));
        j.run = Some(output(Some(0), "hello\n", ""));

        let r = report(&j);
        assert!(r.ok);
        assert_eq!(r.stage, Stage::Run);
        assert_eq!(r.exit_code, Some(0));
        assert_eq!(r.stdout, "hello\n");
        assert!(r.error.is_none());
    }

    #[test]
    fn compile_failed_carries_diagnostics_and_no_run_output() {
        let mut j = job(JobState::CompileFailed);
        j.compile = Some(output(Some(1), "", "main.cpp:3: error: expected ';'"));

        let r = report(&j);
        assert!(!r.ok);
        assert_eq!(r.stage, Stage::Compile);
        assert_eq!(r.error, Some(ErrorKind::CompileFailed));
        assert!(r.stderr.contains("expected ';'"));
    }

    #[test]
    fn run_failed_still_reports_exit_code() {
        let mut j = job(JobState::RunFailed);
        j.compile = Some(output(Some(0), "", ""));
        j.run = Some(output(Some(3), "partial", "boom"));

        let r = report(&j);
        assert!(!r.ok);
        assert_eq!(r.exit_code, Some(3));
        assert_eq!(r.error, Some(ErrorKind::RunFailed));
    }

    #[test]
    fn timeout_is_attributed_to_the_phase_that_ran() {
        let mut during_compile = job(JobState::TimedOut);
        during_compile.compile = Some(output(None, "", ""));
        assert_eq!(report(&during_compile).stage, Stage::Compile);

        let mut during_run = job(JobState::TimedOut);
        during_run.compile = Some(output(Some(0), "", ""));
        during_run.run = Some(output(None, "looping", ""));
        let r = report(&during_run);
        assert_eq!(r.stage, Stage::Run);
        assert_eq!(r.error, Some(ErrorKind::TimedOut));
        assert_eq!(r.stdout, "looping");
    }

    #[test]
    fn timeout_after_clean_compile_is_a_run_stage_timeout() {
        // Deadline expired between compile success and the run spawn:
        // there is no run output, but the compile did not fail.
        let mut j = job(JobState::TimedOut);
        j.compile = Some(output(Some(0), "", ""));

        let r = report(&j);
        assert_eq!(r.stage, Stage::Run);
        assert_eq!(r.error, Some(ErrorKind::TimedOut));
        assert!(r.stdout.is_empty());
        assert!(r.exit_code.is_none());
    }

    #[test]
    fn aborted_surfaces_the_recorded_fault() {
        let mut j = job(JobState::Aborted);
        j.fault = Some(ErrorKind::ToolchainUnavailable);
        assert_eq!(report(&j).error, Some(ErrorKind::ToolchainUnavailable));

        let j = job(JobState::Aborted);
        assert_eq!(report(&j).error, Some(ErrorKind::Aborted));
    }

    #[test]
    fn truncation_flag_flows_through() {
        let mut j = job(JobState::Completed);
        j.run = Some(ProcessOutput {
            exit_code: Some(0),
            stdout: vec![b'x'; 16],
            stderr: Vec::new(),
            truncated: true,
        });
        assert!(report(&j).truncated);
    }
}
