//! ChunkHound: index source repositories into a local content-addressed
//! store and answer regex and semantic searches over code chunks, via a
//! CLI and an MCP tool server.

// Internal modules
mod commands;
mod context;
mod handlers;
mod server;
mod signal;
mod transport;

// Internal imports (std, crate)
use crate::commands::{IndexArgs, McpArgs};
use std::path::PathBuf;
use std::process::ExitCode;

// External imports (alphabetized)
use chunkhound_config::{ApplicationConfig, ConfigError};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

// Exit codes per the CLI contract
const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_INTERRUPT: u8 = 130;

/// ChunkHound code indexing and search
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Optional configuration file path (TOML format)
    #[arg(long, short = 'c', global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index a directory (single-shot, or resident with --watch)
    #[command(alias = "run")]
    Index(IndexArgs),

    /// Start the MCP tool server
    Mcp(McpArgs),
}

fn main() -> ExitCode {
    chunkhound_config::initialize_environment();
    let cli = Cli::parse();

    let mut config = match ApplicationConfig::load(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("chunkhound: configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let (verbose, log_to_file) = match &cli.command {
        Command::Index(args) => {
            args.apply_to(&mut config);
            (args.verbose, false)
        }
        Command::Mcp(args) => {
            args.apply_to(&mut config);
            // In stdio mode stdout carries JSON-RPC; logs go to files and
            // stderr only
            (args.verbose, true)
        }
    };
    let _log_guards = init_logging(verbose, log_to_file);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("chunkhound: failed to start runtime: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let (result, interrupted) = runtime.block_on(async {
        // The shared token is the only thing a signal touches; every
        // resident loop and the worker observe it and unwind in order
        let shutdown = tokio_util::sync::CancellationToken::new();
        let interrupted = signal::spawn_signal_listener(shutdown.clone());

        let result = match &cli.command {
            Command::Index(args) => commands::index::run(args, config, shutdown.clone()).await,
            Command::Mcp(args) => commands::mcp::run(args, config, shutdown.clone()).await,
        };
        (result, interrupted.is_cancelled())
    });

    if interrupted {
        return ExitCode::from(EXIT_INTERRUPT);
    }
    match result {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            if e.downcast_ref::<ConfigError>().is_some() {
                eprintln!("chunkhound: configuration error: {e}");
                ExitCode::from(EXIT_CONFIG)
            } else {
                eprintln!("chunkhound: {e}");
                ExitCode::from(EXIT_ERROR)
            }
        }
    }
}

/// Dual logging: stderr always, plus a daily-rolling file in server mode
///
/// Guards must stay alive for the duration of main or buffered log lines
/// are lost, especially in MCP stdio mode.
fn init_logging(verbose: bool, log_to_file: bool) -> Vec<WorkerGuard> {
    let debug_env = std::env::var("CHUNKHOUND_DEBUG")
        .map(|v| !v.trim().is_empty() && v != "0")
        .unwrap_or(false);
    let default_level = if verbose || debug_env { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let mut guards = vec![stderr_guard];

    if log_to_file {
        let log_dir = default_log_dir();
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender =
                RollingFileAppender::new(Rotation::DAILY, &log_dir, "chunkhound-mcp.log");
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
            guards.push(file_guard);

            tracing_subscriber::fmt()
                .json()
                .with_writer(stderr_writer.and(file_writer))
                .with_env_filter(filter)
                .init();
            return guards;
        }
    }

    tracing_subscriber::fmt()
        .with_writer(stderr_writer)
        .with_env_filter(filter)
        .init();
    guards
}

/// OS-appropriate log directory
fn default_log_dir() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("logs"),
        |data| data.join("chunkhound").join("logs"),
    )
}
