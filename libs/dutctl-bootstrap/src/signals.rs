//! Waits for the process-level shutdown signal: Ctrl+C or, on Unix,
//! `SIGTERM`.

use anyhow::Result;
use tokio::signal;

/// Resolves once `SIGINT`/Ctrl+C or (on Unix) `SIGTERM` is received.
pub async fn wait_for_shutdown() -> Result<()> {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            return Err(e);
        }
        Ok(())
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut handler) => {
                handler.recv().await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                Err(e)
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            tracing::info!("received Ctrl+C, shutting down");
        }
        result = terminate => {
            result?;
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    Ok(())
}
