//! `chunkhound index <path>` - single-shot indexing with optional watch mode

use crate::context::EngineContext;
use chunkhound_config::ApplicationConfig;
use chunkhound_indexing::IndexOptions;
use chunkhound_scheduler::{spawn_periodic_scanner, FileWatcher};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the `index` subcommand
#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Directory to index
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Keep running and index file changes as they happen
    #[arg(long)]
    pub watch: bool,

    /// Skip embedding generation entirely
    #[arg(long)]
    pub no_embeddings: bool,

    /// Include glob (repeatable)
    #[arg(long)]
    pub include: Vec<String>,

    /// Exclude glob (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Database file path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Embedding provider tag
    #[arg(long)]
    pub provider: Option<String>,

    /// Embedding model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Inputs per embedding request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// In-flight embedding requests
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Re-parse every file regardless of the change test
    #[arg(long)]
    pub force_reindex: bool,

    /// Also remove database rows for paths outside this root
    #[arg(long)]
    pub cleanup: bool,

    /// Watcher quiet window in milliseconds
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl IndexArgs {
    /// Fold CLI overrides into the loaded configuration
    pub fn apply_to(&self, config: &mut ApplicationConfig) {
        if let Some(db) = &self.db {
            config.database.path = db.clone();
        }
        if let Some(provider) = &self.provider {
            config.embedding.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            config.embedding.model = model.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.embedding.batch_size = batch_size;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.embedding.max_concurrent = max_concurrent;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.indexing.debounce_ms = debounce_ms;
        }
        config.indexing.include.extend(self.include.iter().cloned());
        config.indexing.exclude.extend(self.exclude.iter().cloned());
    }

    fn index_options(&self, config: &ApplicationConfig) -> IndexOptions {
        IndexOptions {
            include: config.indexing.include.clone(),
            exclude: config.indexing.exclude.clone(),
            force_reindex: self.force_reindex,
            no_embeddings: self.no_embeddings,
            cleanup: self.cleanup,
        }
    }
}

/// Run single-shot indexing, optionally staying resident in watch mode
///
/// # Errors
/// Fatal engine failures; per-file problems are summarized, not fatal.
pub async fn run(
    args: &IndexArgs,
    config: ApplicationConfig,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let root = args.path.canonicalize()?;
    let options = args.index_options(&config);
    let debounce = config.indexing.debounce();
    let periodic_enabled = config.indexing.periodic_enabled;
    let periodic_interval = config.indexing.periodic_interval();

    let context = EngineContext::initialize(config, args.no_embeddings, shutdown).await?;
    let handle = context.handle();

    let summary = match handle.index_directory(root.clone(), options.clone()).await {
        Ok(summary) => summary,
        Err(e) if context.shutdown_token().is_cancelled() => {
            // Interrupted mid-run: the worker rolled back cleanly; make
            // what committed durable and report the interrupt upward
            info!(error = %e, "Indexing interrupted");
            context.shutdown().await?;
            return Ok(());
        }
        Err(e) => {
            context.shutdown().await?;
            return Err(e.into());
        }
    };
    println!(
        "Indexed {}: {} added, {} updated, {} unchanged, {} deleted, {} skipped, {} failed ({} chunks, {} embeddings)",
        root.display(),
        summary.added,
        summary.updated,
        summary.unchanged,
        summary.deleted,
        summary.skipped,
        summary.failed,
        summary.chunks_written,
        summary.embeddings_generated,
    );
    if args.verbose {
        for (path, reason) in &summary.failures {
            eprintln!("  failed: {}: {reason}", path.display());
        }
    }

    if args.watch {
        info!(root = %root.display(), "Entering watch mode");
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

        // Stay resident until a signal or a handoff request fires the token
        context.shutdown_token().cancelled().await;
    }

    context.shutdown().await
}
