/*!
Baton CLI - a budgeted demo task and checkpoint utilities.

`baton run` processes a fixed number of items under an execution ceiling,
handing off to a re-executed copy of itself whenever the ceiling draws near.
`show`, `verify` and `clean` inspect and manage checkpoint files.
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use baton_core::storage::file::read_checkpoint;
use baton_core::{
    launcher, observability, probe, BatonError, FileBackend, ProbeConfig, Relay, RelayConfig, StateBackend,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "baton")]
#[command(about = "Run budgeted tasks that checkpoint and restart themselves")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo task, resuming from a checkpoint if one exists
    Run(RunArgs),
    /// Show the metadata and state of a checkpoint file
    Show {
        /// Checkpoint file path
        path: PathBuf,
    },
    /// Verify integrity of a checkpoint file
    Verify {
        /// Checkpoint file path
        path: PathBuf,
    },
    /// Remove a checkpoint file
    Clean {
        /// Checkpoint file path
        path: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Number of items to process
    #[arg(long, default_value_t = 100)]
    items: u64,

    /// Simulated work per item, in milliseconds
    #[arg(long, default_value_t = 100)]
    work_ms: u64,

    /// Checkpoint file path; defaults to BATON_STORAGE_KEY
    #[arg(long)]
    storage_key: Option<String>,

    /// Seconds of budget that must remain to keep going; defaults to BATON_THRESHOLD
    #[arg(long)]
    threshold: Option<u64>,

    /// Execution ceiling in seconds (0 = unlimited); defaults to BATON_MAX_EXECUTION_TIME
    #[arg(long)]
    ceiling: Option<u64>,

    /// Write a JSON summary here when the task completes
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Tabled)]
struct MetadataRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn main() -> Result<(), anyhow::Error> {
    // The probe sentinel is not a valid argument, so answer before parsing.
    if probe::respond_if_probed(&launcher::current_invocation(), &ProbeConfig::default())? {
        return Ok(());
    }

    let cli = Cli::parse();

    if cli.log_json {
        observability::init_observability(true)?;
    } else {
        init_logging(cli.verbose);
    }

    match cli.command {
        Commands::Run(args) => run_task(args)?,
        Commands::Show { path } => show_checkpoint(&path)?,
        Commands::Verify { path } => verify_checkpoint(&path)?,
        Commands::Clean { path } => clean_checkpoint(&path)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn relay_config(args: &RunArgs) -> Result<RelayConfig, BatonError> {
    let mut config = RelayConfig::from_env()?;
    if let Some(key) = &args.storage_key {
        config.storage_key = key.clone();
    }
    if let Some(threshold) = args.threshold {
        config.threshold_secs = threshold;
    }
    if args.ceiling.is_some() {
        config.ceiling_secs = args.ceiling;
    }
    Ok(config)
}

fn run_task(args: RunArgs) -> Result<(), anyhow::Error> {
    let mut relay = Relay::start(relay_config(&args)?)?;

    let mut next = relay.value_or("progress.next", json!(0)).as_u64().unwrap_or(0);
    let mut sum = relay.value_or("progress.sum", json!(0)).as_u64().unwrap_or(0);
    info!(
        epoch = relay.epoch(),
        resumed = relay.is_resumed(),
        next,
        items = args.items,
        "Starting work"
    );

    while next < args.items {
        thread::sleep(Duration::from_millis(args.work_ms));
        sum += next;
        next += 1;

        relay.check_with_then(
            [("progress.next", json!(next)), ("progress.sum", json!(sum))],
            || info!(next, "Handing off to the next epoch"),
        )?;
    }

    let epochs = relay.epoch() + 1;
    if let Some(output) = &args.output {
        let summary = json!({ "items": next, "sum": sum, "epochs": epochs });
        fs::write(output, serde_json::to_vec_pretty(&summary)?)?;
    }

    relay.finish()?;
    println!("Processed {next} items (sum {sum}) in {epochs} epoch(s)");
    Ok(())
}

fn show_checkpoint(path: &Path) -> Result<(), anyhow::Error> {
    info!("Showing checkpoint: {}", path.display());

    let document = read_checkpoint(path)?;
    let metadata = &document.metadata;

    let rows = vec![
        MetadataRow {
            field: "Checkpoint ID",
            value: metadata.checkpoint_id.clone(),
        },
        MetadataRow {
            field: "Next epoch",
            value: metadata.epoch.to_string(),
        },
        MetadataRow {
            field: "Created",
            value: metadata.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        },
        MetadataRow {
            field: "Format Version",
            value: metadata.format_version.to_string(),
        },
        MetadataRow {
            field: "Content Hash",
            value: metadata.content_hash.clone(),
        },
        MetadataRow {
            field: "Top-level keys",
            value: document.state.len().to_string(),
        },
    ];

    println!("{}", Table::new(rows));
    println!("{}", serde_json::to_string_pretty(&document.state)?);
    Ok(())
}

fn verify_checkpoint(path: &Path) -> Result<(), anyhow::Error> {
    info!("Verifying checkpoint: {}", path.display());

    match read_checkpoint(path).and_then(|document| document.open()) {
        Ok(checkpoint) => {
            println!(
                "✓ Checkpoint is valid and integrity check passed (next epoch {})",
                checkpoint.epoch
            );
            Ok(())
        }
        Err(BatonError::IntegrityCheckFailed { expected, actual }) => {
            error!("✗ Integrity check failed:");
            error!("  Expected hash: {}", expected);
            error!("  Actual hash: {}", actual);
            Err(anyhow::anyhow!("Integrity check failed"))
        }
        Err(e) => {
            error!("✗ Failed to verify checkpoint: {}", e);
            Err(e.into())
        }
    }
}

fn clean_checkpoint(path: &Path) -> Result<(), anyhow::Error> {
    let mut backend = FileBackend::new(path)?;
    if !backend.exists() {
        println!("No checkpoint at {}", path.display());
        return Ok(());
    }

    backend.clean()?;
    println!("✓ Checkpoint removed");
    Ok(())
}
