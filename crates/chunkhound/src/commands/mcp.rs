//! `chunkhound mcp` - start the JSON-RPC tool server

use crate::context::EngineContext;
use crate::server;
use crate::transport::Transport;
use chunkhound_config::ApplicationConfig;
use chunkhound_indexing::IndexOptions;
use chunkhound_scheduler::{spawn_periodic_scanner, FileWatcher};
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the `mcp` subcommand
#[derive(Args, Debug, Clone)]
pub struct McpArgs {
    /// Database file path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Serve over HTTP instead of stdio
    #[arg(long, conflicts_with = "stdio")]
    pub http: bool,

    /// Serve over stdio (the default)
    #[arg(long)]
    pub stdio: bool,

    /// HTTP bind port
    #[arg(long)]
    pub port: Option<u16>,

    /// HTTP bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Allow cross-origin requests in HTTP mode
    #[arg(long)]
    pub cors: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl McpArgs {
    /// Fold CLI overrides into the loaded configuration
    pub fn apply_to(&self, config: &mut ApplicationConfig) {
        if let Some(db) = &self.db {
            config.database.path = db.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if self.cors {
            config.server.cors = true;
        }
    }

    pub const fn transport(&self) -> Transport {
        if self.http {
            Transport::Http
        } else {
            Transport::Stdio
        }
    }
}

/// Start the tool server over the selected transport
///
/// The server also watches the working directory and runs periodic
/// background reconciliation so the index tracks the tree it serves.
///
/// # Errors
/// Fatal failures: cannot open the database, cannot bind the port.
pub async fn run(
    args: &McpArgs,
    config: ApplicationConfig,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let root = std::env::current_dir()?.canonicalize()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let cors = config.server.cors;
    let debounce = config.indexing.debounce();
    let periodic_enabled = config.indexing.periodic_enabled;
    let periodic_interval = config.indexing.periodic_interval();
    let options = IndexOptions {
        include: config.indexing.include.clone(),
        exclude: config.indexing.exclude.clone(),
        ..IndexOptions::default()
    };

    let context = EngineContext::initialize(config, false, shutdown).await?;
    let handle = context.handle();

    // Catch up with the tree, then keep tracking it
    handle.submit_background_scan(root.clone(), options.clone(), None);
    let _watcher = FileWatcher::start(&root, debounce, handle.queue().clone())?;
    let _scanner = periodic_enabled.then(|| {
        spawn_periodic_scanner(
            handle.clone(),
            root.clone(),
            options,
            periodic_interval,
            context.shutdown_token().clone(),
        )
    });

    let shutdown = context.shutdown_token().clone();
    let transport = args.transport();
    info!(%transport, root = %root.display(), "Tool server starting");

    tokio::select! {
        result = async {
            match transport {
                Transport::Stdio => server::run_stdio_server(handle).await,
                Transport::Http => server::run_http_server(handle, addr, cors).await,
            }
        } => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server exited with error");
            }
        }
        () = shutdown.cancelled() => {
            info!("Shutdown requested, stopping server");
        }
    }

    context.shutdown().await
}
