//! veriml - prove, verify and register model inference from the shell
//!
//! ## Commands
//!
//! - `run`: drive the full pipeline for one model file
//! - `status`: print the latest status record of a task
//! - `fetch`: copy a task artifact to a file or stdout

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use veriml_core::{PipelineError, RuntimeArgs};

#[derive(Parser)]
#[command(name = "veriml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verifiable model inference pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage for a model and print the result as JSON
    Run {
        /// ONNX model file
        #[arg(short, long)]
        model: PathBuf,

        /// Task identifier (random UUID when omitted)
        #[arg(short, long)]
        task_id: Option<String>,
    },

    /// Show the latest status of a task
    Status {
        task_id: String,
    },

    /// Fetch one artifact of a task
    Fetch {
        task_id: String,

        /// Artifact file name, e.g. test.pf or Verifier.sol
        artifact: String,

        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    veriml_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { model, task_id } => cmd_run(&cli.runtime, &model, task_id).await,
        Commands::Status { task_id } => cmd_status(&cli.runtime, &task_id),
        Commands::Fetch {
            task_id,
            artifact,
            output,
        } => cmd_fetch(&cli.runtime, &task_id, &artifact, output.as_deref()),
    }
}

async fn cmd_run(runtime: &RuntimeArgs, model: &Path, task_id: Option<String>) -> Result<()> {
    let coordinator = runtime
        .coordinator()
        .context("Invalid chain configuration")?;
    let bytes = std::fs::read(model).with_context(|| format!("Failed to read {:?}", model))?;
    let task_id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    eprintln!("Task: {task_id}");
    match coordinator.run(&task_id, &bytes).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => {
            if let Some(partial) = err.partial() {
                println!("{}", serde_json::to_string_pretty(partial)?);
            }
            let hint = match &err {
                PipelineError::TaskBusy(_) | PipelineError::InvalidInput(_) => "",
                _ => " (see `veriml status` for the recorded failure)",
            };
            Err(anyhow::Error::new(err).context(format!("Pipeline failed for {task_id}{hint}")))
        }
    }
}

fn cmd_status(runtime: &RuntimeArgs, task_id: &str) -> Result<()> {
    let store = veriml_core::ArtifactStore::new(runtime.artifacts_root.clone());
    let status = veriml_core::StatusLedger::new(store)
        .read(task_id)
        .with_context(|| format!("Unknown task: {task_id}"))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.is_terminal() {
        eprintln!("Task {task_id} has not finished (last step: {})", status.step);
    }
    Ok(())
}

fn cmd_fetch(
    runtime: &RuntimeArgs,
    task_id: &str,
    artifact: &str,
    output: Option<&Path>,
) -> Result<()> {
    let store = veriml_core::ArtifactStore::new(runtime.artifacts_root.clone());
    let bytes = store
        .fetch(task_id, artifact)
        .with_context(|| format!("Cannot fetch {artifact} for {task_id}"))?;

    if let Some(path) = output {
        std::fs::write(path, &bytes).with_context(|| format!("Failed to write to {:?}", path))?;
        println!("Wrote {} bytes to {:?}", bytes.len(), path);
    } else {
        std::io::stdout().write_all(&bytes)?;
    }
    Ok(())
}
