/// Toolchain Invoker - Controlled Child Processes
///
/// **Core Responsibility:**
/// Spawn the external compiler and the produced executable as controlled
/// children: argv vectors only (never a shell), cwd pinned to the job's
/// workspace, own process group, rlimits applied, output capped, and a
/// hard deadline racing every wait.
///
/// **Process Rules:**
/// 1. The source text is written verbatim to a fixed file name inside the
///    workspace; client-supplied names never reach the filesystem
/// 2. Spawn failure (binary missing, permission denied) is a distinct
///    fault from a nonzero exit - the first means the service is broken,
///    the second means the submitted code is
/// 3. Losing the deadline race kills the entire process group, not just
///    the direct child, so grandchildren cannot leak
/// 4. stdout/stderr are drained incrementally into capped buffers; bytes
///    past the cap are dropped and the output is marked truncated
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fixed names inside every workspace. Uniqueness across jobs comes from
/// the workspace directory, which is derived from the job UUID.
pub const SOURCE_FILE: &str = "main.cpp";
pub const ARTIFACT_FILE: &str = "main";

const READ_CHUNK: usize = 8 * 1024;
const FILE_SIZE_LIMIT: u64 = 64 * 1024 * 1024;
const OPEN_FILES_LIMIT: u64 = 256;

/// Spawning or plumbing failed; the child's own exit status is never an
/// error at this layer.
#[derive(Debug)]
pub enum ToolchainError {
    /// The binary could not be spawned at all.
    Unavailable(io::Error),
    /// Workspace or pipe I/O failed mid-flight.
    Io(io::Error),
}

impl std::fmt::Display for ToolchainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolchainError::Unavailable(err) => write!(f, "toolchain unavailable: {}", err),
            ToolchainError::Io(err) => write!(f, "toolchain i/o failure: {}", err),
        }
    }
}

impl std::error::Error for ToolchainError {}

/// Captured result of one child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// None when the process was killed by a signal (or by us).
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Set when either stream hit the byte cap.
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Whichever of "process exit" or "deadline elapsed" happened first.
#[derive(Debug)]
pub enum WaitOutcome {
    Exited(ProcessOutput),
    /// The group was killed; partial output is still carried.
    DeadlineExceeded(ProcessOutput),
}

#[derive(Debug, Clone)]
pub struct Toolchain {
    compiler: String,
    compile_flags: Vec<String>,
    max_output_bytes: usize,
    memory_limit_mb: u64,
}

impl Toolchain {
    pub fn new(
        compiler: impl Into<String>,
        compile_flags: Vec<String>,
        max_output_bytes: usize,
        memory_limit_mb: u64,
    ) -> Self {
        Self {
            compiler: compiler.into(),
            compile_flags,
            max_output_bytes,
            memory_limit_mb,
        }
    }

    /// Write the source verbatim and spawn exactly one compiler process.
    pub async fn compile(
        &self,
        source_text: &str,
        workspace: &Path,
        deadline: Instant,
    ) -> Result<WaitOutcome, ToolchainError> {
        tokio::fs::write(workspace.join(SOURCE_FILE), source_text)
            .await
            .map_err(ToolchainError::Io)?;

        let mut cmd = Command::new(&self.compiler);
        cmd.args(&self.compile_flags)
            .arg("-o")
            .arg(ARTIFACT_FILE)
            .arg(SOURCE_FILE)
            .current_dir(workspace);
        // The compiler gets CPU and file-size ceilings but no address-space
        // cap; template-heavy translation units legitimately need memory.
        self.confine(&mut cmd, deadline, None);

        self.spawn_and_wait(cmd, deadline).await
    }

    /// Execute the compiled artifact, environment cleared, stdin closed.
    pub async fn run(
        &self,
        workspace: &Path,
        deadline: Instant,
    ) -> Result<WaitOutcome, ToolchainError> {
        let mut cmd = Command::new(workspace.join(ARTIFACT_FILE));
        cmd.current_dir(workspace).env_clear();
        self.confine(&mut cmd, deadline, Some(self.memory_limit_mb));

        self.spawn_and_wait(cmd, deadline).await
    }

    /// Apply process-group and rlimit confinement to a command.
    ///
    /// Runs in the forked child via pre_exec, so only async-signal-safe
    /// libc calls are allowed there.
    fn confine(&self, cmd: &mut Command, deadline: Instant, memory_limit_mb: Option<u64>) {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            use nix::sys::resource::Resource;

            let cpu_secs = deadline
                .saturating_duration_since(Instant::now())
                .as_secs()
                .saturating_add(1);
            unsafe {
                cmd.pre_exec(move || {
                    if libc::setpgid(0, 0) != 0 {
                        return Err(io::Error::last_os_error());
                    }
                    set_rlimit(Resource::RLIMIT_CPU, cpu_secs, cpu_secs + 1);
                    set_rlimit(Resource::RLIMIT_FSIZE, FILE_SIZE_LIMIT, FILE_SIZE_LIMIT);
                    set_rlimit(Resource::RLIMIT_NOFILE, OPEN_FILES_LIMIT, OPEN_FILES_LIMIT);
                    if let Some(mb) = memory_limit_mb {
                        let bytes = mb * 1024 * 1024;
                        set_rlimit(Resource::RLIMIT_AS, bytes, bytes);
                    }
                    Ok(())
                });
            }
        }
    }

    async fn spawn_and_wait(
        &self,
        mut cmd: Command,
        deadline: Instant,
    ) -> Result<WaitOutcome, ToolchainError> {
        let mut child = cmd.spawn().map_err(|err| match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                ToolchainError::Unavailable(err)
            }
            _ => ToolchainError::Io(err),
        })?;
        let pid = child.id();

        // `kill_on_drop` only reaches the direct child. If this future is
        // dropped mid-wait (caller cancellation), the guard kills the whole
        // group so forked grandchildren die with the job, same as the
        // deadline path below.
        let mut group = GroupKillGuard { pid, armed: true };

        // Streams are drained concurrently with the wait so a chatty child
        // can never block on a full pipe.
        let stdout = child.stdout.take().ok_or_else(|| {
            ToolchainError::Io(io::Error::other("child stdout not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ToolchainError::Io(io::Error::other("child stderr not captured"))
        })?;
        let cap = self.max_output_bytes;
        let stdout_task = tokio::spawn(read_capped(stdout, cap));
        let stderr_task = tokio::spawn(read_capped(stderr, cap));

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => Some(status.map_err(ToolchainError::Io)?),
            Err(_elapsed) => {
                // Deadline lost the race: kill the whole group, then reap.
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                terminate(&mut child).await;
                None
            }
        };
        group.disarm();

        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();
        let output = ProcessOutput {
            exit_code: status.and_then(|s| s.code()),
            stdout,
            stderr,
            truncated: stdout_truncated || stderr_truncated,
        };

        match status {
            Some(status) => {
                debug!(exit_code = ?status.code(), "Child process exited");
                Ok(WaitOutcome::Exited(output))
            }
            None => Ok(WaitOutcome::DeadlineExceeded(output)),
        }
    }
}

/// Read a stream to EOF, keeping at most `cap` bytes.
///
/// Bytes past the cap are read and dropped rather than left in the pipe,
/// so the child keeps making progress until it exits or is killed.
async fn read_capped<R>(mut reader: R, cap: usize) -> (Vec<u8>, bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let room = cap.saturating_sub(buf.len());
                let take = room.min(n);
                buf.extend_from_slice(&chunk[..take]);
                if take < n {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (buf, truncated)
}

/// Kills the child's process group when dropped while armed; the normal
/// exit and deadline paths disarm it once the wait has resolved.
struct GroupKillGuard {
    pid: Option<u32>,
    armed: bool,
}

impl GroupKillGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupKillGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        warn!(pid = pid, error = %err, "Failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

// Failure here is non-fatal: the deadline race still bounds the child.
#[cfg(unix)]
fn set_rlimit(resource: nix::sys::resource::Resource, soft: u64, hard: u64) {
    let _ = nix::sys::resource::setrlimit(resource, soft, hard);
}

/// Best-effort reap after a group kill so no zombie outlives the job.
async fn terminate(child: &mut Child) {
    let _ = child.start_kill();
    match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
        Ok(_) => {}
        Err(_) => warn!("Child did not reap within grace period"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn read_capped_truncates_and_drains() {
        let data = vec![b'x'; 100_000];
        let (buf, truncated) = read_capped(&data[..], 1024).await;
        assert_eq!(buf.len(), 1024);
        assert!(truncated);

        let (buf, truncated) = read_capped(&b"short"[..], 1024).await;
        assert_eq!(buf, b"short");
        assert!(!truncated);
    }

    #[tokio::test]
    async fn missing_compiler_is_unavailable_not_failed() {
        let toolchain = Toolchain::new(
            "crucible-no-such-compiler",
            vec![],
            4096,
            64,
        );
        let workspace = std::env::temp_dir().join(format!("crucible-tc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&workspace).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = toolchain.compile("int main() {}", &workspace, deadline).await;
        assert!(matches!(result, Err(ToolchainError::Unavailable(_))));

        let _ = std::fs::remove_dir_all(&workspace);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn deadline_kills_sleeping_child() {
        // /bin/sh as a stand-in "compiler" that never finishes.
        let toolchain = Toolchain::new("/bin/sh", vec![], 4096, 64);
        let workspace = std::env::temp_dir().join(format!("crucible-tc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&workspace).unwrap();

        // `sh -o main main.cpp` would fail fast, so call spawn_and_wait
        // directly with a sleeping command.
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg("sleep 30").current_dir(&workspace);
        toolchain.confine(&mut cmd, Instant::now() + Duration::from_millis(200), None);

        let started = std::time::Instant::now();
        let outcome = toolchain
            .spawn_and_wait(cmd, Instant::now() + Duration::from_millis(200))
            .await
            .unwrap();
        assert!(matches!(outcome, WaitOutcome::DeadlineExceeded(_)));
        assert!(started.elapsed() < Duration::from_secs(5));

        let _ = std::fs::remove_dir_all(&workspace);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_kills_forked_grandchildren() {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let toolchain = Toolchain::new("/bin/sh", vec![], 4096, 64);
        let workspace = std::env::temp_dir().join(format!("crucible-tc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&workspace).unwrap();

        // Forks a sleeper, records its pid, then blocks.
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg("/bin/sleep 30 & echo $! > gpid; wait")
            .current_dir(&workspace);
        let deadline = Instant::now() + Duration::from_secs(30);
        toolchain.confine(&mut cmd, deadline, None);

        let tc = toolchain.clone();
        let task = tokio::spawn(async move { tc.spawn_and_wait(cmd, deadline).await });

        // Wait for the grandchild pid to land on disk.
        let gpid_path = workspace.join("gpid");
        let mut grandchild = None;
        for _ in 0..250 {
            if let Ok(raw) = std::fs::read_to_string(&gpid_path) {
                if let Ok(pid) = raw.trim().parse::<i32>() {
                    grandchild = Some(Pid::from_raw(pid));
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let grandchild = grandchild.expect("grandchild pid never appeared");

        // Drop the wait mid-flight, as a disconnecting client would.
        task.abort();
        let _ = task.await;

        // The whole group dies, not just the direct child. Reaping of the
        // orphan can lag, so poll.
        let mut gone = false;
        for _ in 0..250 {
            if kill(grandchild, None).is_err() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "grandchild survived cancellation");

        let _ = std::fs::remove_dir_all(&workspace);
    }
}
