//! Signal handling
//!
//! The handler only cancels the shutdown token and returns. The worker
//! observes the token at its next suspension point and drives the drain,
//! checkpoint, and close sequence; no database work ever runs in signal
//! context.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Spawn a listener that cancels `shutdown` on SIGINT/SIGTERM
///
/// Returns a token that is cancelled only for a user interrupt, so the
/// process can exit 130 in that case.
pub fn spawn_signal_listener(shutdown: CancellationToken) -> CancellationToken {
    let interrupted = CancellationToken::new();
    let interrupted_flag = interrupted.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {
                info!("Interrupt received, requesting shutdown");
                interrupted_flag.cancel();
            }
            () = terminate => {
                info!("Termination signal received, requesting shutdown");
            }
        }

        // Only set the flag; the worker performs the checkpoint-then-close
        shutdown.cancel();
    });

    interrupted
}
