use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single compile-and-run submission as it arrives over the wire.
///
/// `logical_name` is display-only. Workspace directories and artifact
/// names are derived from the job's UUID, never from client text, so a
/// hostile name cannot become a path component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRequest {
    pub source_text: String,
    #[serde(default)]
    pub logical_name: Option<String>,
}

/// Which phase of the pipeline produced the reported output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => write!(f, "compile"),
            Stage::Run => write!(f, "run"),
        }
    }
}

/// Failure classification surfaced to clients.
///
/// `CompileFailed`, `RunFailed` and `TimedOut` are expected outcomes of
/// running someone's code and travel with the captured output. `Resource`,
/// `ToolchainUnavailable`, `Busy` and `Aborted` are operational faults, so
/// a client can tell "your code is wrong" apart from "the service is
/// broken".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Workspace allocation failed (filesystem unwritable or exhausted).
    Resource,
    /// Compiler or produced binary missing or unspawnable.
    ToolchainUnavailable,
    /// Nonzero compiler exit; stderr carries the diagnostics.
    CompileFailed,
    /// Nonzero program exit; the exit code is still reported.
    RunFailed,
    /// A child process outlived its deadline and was killed.
    TimedOut,
    /// Concurrency gate at capacity and the queue is full or disabled.
    Busy,
    /// Cancellation or an unexpected internal fault.
    Aborted,
}

impl ErrorKind {
    /// True for faults of the service rather than of the submitted code.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            ErrorKind::Resource | ErrorKind::ToolchainUnavailable | ErrorKind::Busy | ErrorKind::Aborted
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Resource => write!(f, "resource"),
            ErrorKind::ToolchainUnavailable => write!(f, "toolchain_unavailable"),
            ErrorKind::CompileFailed => write!(f, "compile_failed"),
            ErrorKind::RunFailed => write!(f, "run_failed"),
            ErrorKind::TimedOut => write!(f, "timed_out"),
            ErrorKind::Busy => write!(f, "busy"),
            ErrorKind::Aborted => write!(f, "aborted"),
        }
    }
}

/// The stable response contract for one finished job.
///
/// Derivable purely from a terminal job's state and buffers; it carries no
/// live process information, so serializing it can never race cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub job_id: Uuid,
    pub ok: bool,
    pub stage: Stage,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Compile).unwrap(), "\"compile\"");
        assert_eq!(serde_json::to_string(&Stage::Run).unwrap(), "\"run\"");
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ToolchainUnavailable).unwrap(),
            "\"toolchain_unavailable\""
        );
        assert_eq!(serde_json::to_string(&ErrorKind::TimedOut).unwrap(), "\"timed_out\"");
    }

    #[test]
    fn operational_faults_are_classified() {
        assert!(ErrorKind::Resource.is_operational());
        assert!(ErrorKind::Busy.is_operational());
        assert!(!ErrorKind::CompileFailed.is_operational());
        assert!(!ErrorKind::TimedOut.is_operational());
    }

    #[test]
    fn report_omits_absent_fields() {
        let report = RunReport {
            job_id: Uuid::new_v4(),
            ok: true,
            stage: Stage::Run,
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            truncated: false,
            error: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"exit_code\":0"));
    }

    #[test]
    fn request_accepts_missing_logical_name() {
        let req: CompileRequest =
            serde_json::from_str(r#"{"source_text":"int main(){}"}"#).unwrap();
        assert!(req.logical_name.is_none());
    }
}
