/// Execution Engine - The Assembled Pipeline
///
/// **Core Responsibility:**
/// Accept one untrusted submission and return its report, owning the whole
/// admission → workspace → compile → run → release → report sequence.
///
/// **Critical Architectural Boundary:**
/// - The engine knows HOW to execute (processes, workspaces, deadlines)
/// - It does NOT know about HTTP, serialization formats, or AI services
/// - Callers get a `RunReport` and nothing else; all process handles and
///   paths stay inside
///
/// A request flows: concurrency gate → job controller (workspace manager +
/// toolchain invoker) → unconditional workspace release → result reporter.
/// The gate slot is freed the moment release completes, before the report
/// is handed back, so response serialization never holds capacity.
use std::time::Duration;

use tracing::{info, warn};

use crucible_common::config::ServiceConfig;
use crucible_common::types::{CompileRequest, ErrorKind, RunReport};

use crate::gate::{Busy, ConcurrencyGate};
use crate::job::JobController;
use crate::report;
use crate::toolchain::Toolchain;
use crate::workspace::WorkspaceManager;

pub struct Engine {
    gate: ConcurrencyGate,
    controller: JobController,
    max_source_bytes: usize,
}

impl Engine {
    pub fn new(config: &ServiceConfig) -> Self {
        let workspaces = WorkspaceManager::new(config.workspace_root.clone());
        let toolchain = Toolchain::new(
            config.compiler.clone(),
            config.compile_flags.clone(),
            config.max_output_bytes,
            config.memory_limit_mb,
        );
        let controller = JobController::new(
            workspaces,
            toolchain,
            Duration::from_millis(config.compile_timeout_ms),
            Duration::from_millis(config.run_timeout_ms),
        );
        let gate = ConcurrencyGate::new(
            config.max_jobs,
            config.max_queue,
            Duration::from_millis(config.queue_wait_ms),
        );
        Self {
            gate,
            controller,
            max_source_bytes: config.max_source_bytes,
        }
    }

    /// Run one submission end to end. Never panics outward; every outcome,
    /// expected or operational, comes back as a `RunReport`.
    pub async fn submit(&self, request: &CompileRequest) -> RunReport {
        if request.source_text.len() > self.max_source_bytes {
            warn!(
                source_bytes = request.source_text.len(),
                cap = self.max_source_bytes,
                "Submission over source size cap"
            );
            return report::refused_report(
                ErrorKind::Resource,
                format!("source exceeds maximum size of {} bytes", self.max_source_bytes),
            );
        }

        let slot = match self.gate.admit().await {
            Ok(slot) => slot,
            Err(Busy) => {
                info!("Submission refused, gate busy");
                return report::refused_report(ErrorKind::Busy, String::new());
            }
        };

        let job = self.controller.execute(&request.source_text).await;

        // Workspace is already released; free the slot before serializing
        // anything so the next queued admission proceeds immediately.
        drop(slot);

        report::report(&job)
    }

    /// Free slots right now; exposed for health reporting.
    pub fn available_slots(&self) -> usize {
        self.gate.available()
    }
}
