//! Graceful shutdown.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the returned token; the sync
//! loop finishes its in-flight item, commits the record store and reports an
//! interrupted run. A second signal exits immediately with status 130.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

/// Register signal listeners and return the token they cancel.
///
/// Must be called from within a tokio runtime.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let token = CancellationToken::new();
    let received = Arc::new(AtomicU32::new(0));

    #[cfg(unix)]
    let (mut sigterm, mut sighup) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?,
            signal(SignalKind::hangup()).context("Failed to register SIGHUP handler")?,
        )
    };

    let handler_token = token.clone();
    tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                    _ = sighup.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Ctrl+C listener stopped");
                    return;
                }
            }

            if received.fetch_add(1, Ordering::SeqCst) == 0 {
                tracing::info!("Shutdown requested, finishing the current item and saving progress");
                tracing::info!("Press Ctrl+C again to exit immediately");
                handler_token.cancel();
            } else {
                tracing::warn!("Forced exit, uncommitted progress is lost");
                std::process::exit(130);
            }
        }
    });

    Ok(token)
}
