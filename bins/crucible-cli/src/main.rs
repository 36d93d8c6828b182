mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "crucible-cli")]
#[command(about = "Crucible CLI - Compile and run untrusted C++ locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file and execute the produced binary
    Run {
        /// Path to a single C++ source file
        file: String,

        /// Compiler binary (defaults to CRUCIBLE_COMPILER or g++)
        #[arg(short, long)]
        compiler: Option<String>,

        /// Compile deadline in milliseconds
        #[arg(long)]
        compile_timeout_ms: Option<u64>,

        /// Run deadline in milliseconds
        #[arg(long)]
        run_timeout_ms: Option<u64>,

        /// Emit the raw report as JSON instead of human-readable text
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Compile only; report diagnostics without executing anything
    Check {
        /// Path to a single C++ source file
        file: String,

        /// Compiler binary (defaults to CRUCIBLE_COMPILER or g++)
        #[arg(short, long)]
        compiler: Option<String>,

        /// Compile deadline in milliseconds
        #[arg(long)]
        compile_timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            compiler,
            compile_timeout_ms,
            run_timeout_ms,
            json,
        } => {
            commands::run_file(&file, compiler, compile_timeout_ms, run_timeout_ms, json).await
        }
        Commands::Check {
            file,
            compiler,
            compile_timeout_ms,
        } => commands::check_file(&file, compiler, compile_timeout_ms).await,
    }
}
