/// Workspace Manager - Isolated Per-Job Filesystem Areas
///
/// **Core Responsibility:**
/// Allocate a fresh, uniquely named directory for one job and guarantee its
/// removal on every exit path.
///
/// **Isolation Rules:**
/// - Directory names derive from the job UUID, never from client text
/// - Exactly one live directory per job; no two jobs ever share a path
/// - Removal tolerates files the manager did not create (child processes
///   are free to write extra artifacts into their workspace)
/// - Removal failures are logged, never propagated: they must not mask the
///   job's real outcome
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the workspace directory for a job.
    ///
    /// Fails with the underlying io::Error when the filesystem is
    /// unwritable or exhausted; the controller surfaces that as a
    /// resource fault.
    pub fn acquire(&self, job_id: Uuid) -> io::Result<Workspace> {
        let path = self.root.join(format!("job-{}", job_id));
        fs::create_dir_all(&path)?;
        debug!(job_id = %job_id, path = %path.display(), "Workspace acquired");
        Ok(Workspace {
            path,
            released: false,
        })
    }
}

/// An exclusively owned workspace directory.
///
/// Callers release it explicitly once the job reaches a terminal state;
/// `Drop` performs the same removal so a panic or a cancelled task still
/// satisfies the cleanup invariant. Removal happens exactly once.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the whole directory tree, extra child-created files included.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Workspace released"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to remove workspace");
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("crucible-ws-test-{}-{}", tag, Uuid::new_v4()))
    }

    #[test]
    fn acquire_creates_unique_directory() {
        let root = test_root("acquire");
        let manager = WorkspaceManager::new(&root);

        let a = manager.acquire(Uuid::new_v4()).unwrap();
        let b = manager.acquire(Uuid::new_v4()).unwrap();

        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert_ne!(a.path(), b.path());

        a.release();
        b.release();
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn release_removes_child_created_files() {
        let root = test_root("release");
        let manager = WorkspaceManager::new(&root);

        let workspace = manager.acquire(Uuid::new_v4()).unwrap();
        let path = workspace.path().to_path_buf();
        fs::write(path.join("artifact.o"), b"leftover").unwrap();
        fs::create_dir(path.join("nested")).unwrap();
        fs::write(path.join("nested").join("core"), b"dump").unwrap();

        workspace.release();
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn drop_is_a_cleanup_backstop() {
        let root = test_root("drop");
        let manager = WorkspaceManager::new(&root);

        let path = {
            let workspace = manager.acquire(Uuid::new_v4()).unwrap();
            workspace.path().to_path_buf()
            // dropped without an explicit release
        };
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    #[cfg(unix)]
    fn acquire_fails_on_unwritable_root() {
        use std::os::unix::fs::PermissionsExt;

        let root = test_root("unwritable");
        fs::create_dir_all(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o444)).unwrap();

        let manager = WorkspaceManager::new(&root);
        let result = manager.acquire(Uuid::new_v4());
        // Skip the assertion when running as root, which ignores mode bits.
        if !nix::unistd::Uid::effective().is_root() {
            assert!(result.is_err());
        }

        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
        let _ = fs::remove_dir_all(&root);
    }
}
