// Service configuration
// All knobs come from CRUCIBLE_* environment variables with safe defaults,
// so a bare `crucible-server` starts with a working local setup.

use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub addr: String,
    /// Root directory under which per-job workspaces are created.
    pub workspace_root: PathBuf,
    /// Compiler binary, resolved through PATH.
    pub compiler: String,
    /// Flags passed to every compiler invocation, whitespace-separated in
    /// the environment variable.
    pub compile_flags: Vec<String>,
    /// Maximum simultaneous in-flight jobs.
    pub max_jobs: usize,
    /// Maximum admissions allowed to wait for a slot. 0 disables queueing.
    pub max_queue: usize,
    /// How long a queued admission may wait before being turned away.
    pub queue_wait_ms: u64,
    pub compile_timeout_ms: u64,
    pub run_timeout_ms: u64,
    /// Cap on each captured stream; bytes beyond it are dropped.
    pub max_output_bytes: usize,
    /// Cap on accepted source text.
    pub max_source_bytes: usize,
    /// Address-space limit applied to child processes.
    pub memory_limit_mb: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3001".to_string(),
            workspace_root: std::env::temp_dir().join("crucible"),
            compiler: "g++".to_string(),
            compile_flags: vec!["-std=c++17".to_string()],
            max_jobs: 4,
            max_queue: 16,
            queue_wait_ms: 10_000,
            compile_timeout_ms: 15_000,
            run_timeout_ms: 5_000,
            max_output_bytes: 1024 * 1024,
            max_source_bytes: 1024 * 1024,
            memory_limit_mb: 256,
        }
    }
}

impl ServiceConfig {
    /// Build a configuration from CRUCIBLE_* environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: env_or("CRUCIBLE_ADDR", defaults.addr),
            workspace_root: std::env::var("CRUCIBLE_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            compiler: env_or("CRUCIBLE_COMPILER", defaults.compiler),
            compile_flags: std::env::var("CRUCIBLE_COMPILE_FLAGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.compile_flags),
            max_jobs: env_parse("CRUCIBLE_MAX_JOBS", defaults.max_jobs),
            max_queue: env_parse("CRUCIBLE_MAX_QUEUE", defaults.max_queue),
            queue_wait_ms: env_parse("CRUCIBLE_QUEUE_WAIT_MS", defaults.queue_wait_ms),
            compile_timeout_ms: env_parse("CRUCIBLE_COMPILE_TIMEOUT_MS", defaults.compile_timeout_ms),
            run_timeout_ms: env_parse("CRUCIBLE_RUN_TIMEOUT_MS", defaults.run_timeout_ms),
            max_output_bytes: env_parse("CRUCIBLE_MAX_OUTPUT_BYTES", defaults.max_output_bytes),
            max_source_bytes: env_parse("CRUCIBLE_MAX_SOURCE_BYTES", defaults.max_source_bytes),
            memory_limit_mb: env_parse("CRUCIBLE_MEMORY_LIMIT_MB", defaults.memory_limit_mb),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServiceConfig::default();
        assert_eq!(config.compiler, "g++");
        assert!(config.max_jobs >= 1);
        assert!(config.max_output_bytes > 0);
        assert!(config.workspace_root.ends_with("crucible"));
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("CRUCIBLE_TEST_PARSE_KEY", "not-a-number");
        assert_eq!(env_parse("CRUCIBLE_TEST_PARSE_KEY", 7usize), 7);
        std::env::remove_var("CRUCIBLE_TEST_PARSE_KEY");
    }
}
