//! drivesync CLI - Command-line interface for drivesync
//!
//! Provides commands for:
//! - Cloning a drive into a new home and logging in
//! - Pulling remote changes and pushing local ones
//! - Discarding local changes and inspecting pending ones
//! - Index administration and standalone uploads
//!
//! Without a subcommand, `pull` and then `push` run in sequence.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

mod commands;
mod output;

use commands::{
    clone::CloneCommand,
    index::IndexCommand,
    info::InfoCommand,
    login::LoginCommand,
    put::PutCommand,
    reset::ResetCommand,
    status::StatusCommand,
    sync::{self, PullCommand, PushCommand},
    CommandContext, CommandStatus,
};
use output::{Output, OutputFormat};

/// Appended to by `--debug-all`, in the user's home directory
const DEBUG_LOG_FILE: &str = ".drivesync.log";

#[derive(Debug, Parser)]
#[command(
    name = "drivesync",
    version,
    about = "Bidirectional Google Drive synchronizer"
)]
pub struct Cli {
    /// Synchronized home directory
    #[arg(long, global = true, default_value = ".")]
    home: PathBuf,

    /// Compute and report actions without changing anything
    #[arg(long, global = true)]
    simulation: bool,

    /// Debug logging for drivesync itself
    #[arg(long, global = true)]
    debug: bool,

    /// Debug logging for everything, also appended to ~/.drivesync.log
    #[arg(long, global = true)]
    debug_all: bool,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Mirror the drive into an empty home
    Clone(CloneCommand),
    /// Apply remote changes since the last sync
    Pull(PullCommand),
    /// Send local changes to the drive
    Push(PushCommand),
    /// Discard local changes
    Reset(ResetCommand),
    /// Show pending local and remote changes
    Status(StatusCommand),
    /// Authorize access to the drive
    Login(LoginCommand),
    /// Look up an entry by path or id
    Info(InfoCommand),
    /// Edit the index directly
    #[command(subcommand)]
    Index(IndexCommand),
    /// Upload files into a remote folder, outside of any index
    Put(PutCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::from_flag(cli.json);

    match run(cli, format).await {
        Ok(CommandStatus::Done) => ExitCode::SUCCESS,
        Ok(CommandStatus::Refused) => ExitCode::FAILURE,
        Err(e) => {
            Output::new(format).error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, format: OutputFormat) -> Result<CommandStatus> {
    let ctx = CommandContext::new(&cli.home, cli.simulation, format)?;
    init_tracing(&cli, &ctx.config.logging.level)?;
    if ctx.simulation {
        info!("Simulation: no remote or local changes will be made");
    }

    match &cli.command {
        None => sync::sync_both(&ctx).await,
        Some(Commands::Clone(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Pull(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Push(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Reset(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Status(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Login(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Info(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Index(cmd)) => cmd.execute(&ctx).await,
        Some(Commands::Put(cmd)) => cmd.execute(&ctx).await,
    }
}

/// Filter directives used when `RUST_LOG` is not set
fn log_directives(debug: bool, debug_all: bool, level: &str) -> String {
    if debug_all {
        "debug".to_string()
    } else if debug {
        format!("{level},drivesync=debug")
    } else {
        level.to_string()
    }
}

fn init_tracing(cli: &Cli, level: &str) -> Result<()> {
    let directives = log_directives(cli.debug, cli.debug_all, level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let stderr_layer = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    };

    let mut log_error = None;
    let file_layer = if cli.debug_all {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEBUG_LOG_FILE);
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                log_error = Some((path, e));
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    if let Some((path, e)) = log_error {
        warn!(path = %path.display(), error = %e, "Cannot open debug log file");
    }
    Ok(())
}
