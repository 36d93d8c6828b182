//! The compile-and-execute pipeline: admission gating, isolated per-job
//! workspaces, controlled child processes with deadlines and capped
//! output, and a stable report contract.

pub mod engine;
pub mod gate;
pub mod job;
pub mod report;
pub mod toolchain;
pub mod workspace;


pub use engine::Engine;
