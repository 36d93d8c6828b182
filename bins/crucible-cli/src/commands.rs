use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crucible_common::config::ServiceConfig;
use crucible_common::types::{CompileRequest, RunReport};
use crucible_engine::job::JobController;
use crucible_engine::toolchain::Toolchain;
use crucible_engine::workspace::WorkspaceManager;
use crucible_engine::Engine;

fn load_config(
    compiler: Option<String>,
    compile_timeout_ms: Option<u64>,
    run_timeout_ms: Option<u64>,
) -> ServiceConfig {
    let mut config = ServiceConfig::from_env();
    if let Some(compiler) = compiler {
        config.compiler = compiler;
    }
    if let Some(ms) = compile_timeout_ms {
        config.compile_timeout_ms = ms;
    }
    if let Some(ms) = run_timeout_ms {
        config.run_timeout_ms = ms;
    }
    // One job at a time; the CLI is single-shot.
    config.max_jobs = 1;
    config
}

fn read_source(file: &str) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Failed to read source file {}", file))
}

/// Full compile-and-run of a local file through the same engine the
/// server uses.
pub async fn run_file(
    file: &str,
    compiler: Option<String>,
    compile_timeout_ms: Option<u64>,
    run_timeout_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let source_text = read_source(file)?;
    let config = load_config(compiler, compile_timeout_ms, run_timeout_ms);
    let engine = Engine::new(&config);

    let request = CompileRequest {
        source_text,
        logical_name: Path::new(file)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    };
    let report = engine.submit(&request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Compile only: same toolchain and workspace discipline, no run phase.
pub async fn check_file(
    file: &str,
    compiler: Option<String>,
    compile_timeout_ms: Option<u64>,
) -> Result<()> {
    let source_text = read_source(file)?;
    let config = load_config(compiler, compile_timeout_ms, None);

    let controller = JobController::new(
        WorkspaceManager::new(config.workspace_root.clone()),
        Toolchain::new(
            config.compiler.clone(),
            config.compile_flags.clone(),
            config.max_output_bytes,
            config.memory_limit_mb,
        ),
        Duration::from_millis(config.compile_timeout_ms),
        Duration::ZERO,
    );

    let outcome = controller.compile_only(&source_text).await;
    match outcome.compile {
        Some(output) if output.exit_code == Some(0) => {
            println!("✓ {} compiles cleanly", file);
            Ok(())
        }
        Some(output) => {
            eprintln!("✗ Compilation failed");
            eprint!("{}", output.stderr_lossy());
            std::process::exit(1);
        }
        None => {
            eprintln!("✗ Compiler unavailable or deadline exceeded ({:?})", outcome.state);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &RunReport) {
    match report.error {
        None => println!("✓ Completed (exit code 0)"),
        Some(kind) => println!("✗ {} in {} stage", kind, report.stage),
    }
    if let Some(code) = report.exit_code {
        if code != 0 {
            println!("  exit code: {}", code);
        }
    }
    if report.truncated {
        println!("  (output truncated)");
    }
    if !report.stdout.is_empty() {
        println!("--- stdout ---");
        print!("{}", report.stdout);
    }
    if !report.stderr.is_empty() {
        println!("--- stderr ---");
        print!("{}", report.stderr);
    }
}
