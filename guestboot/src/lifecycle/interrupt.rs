//! Turns the process interrupt signal into token cancellation.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first interrupt. The watcher ends early if the
/// token is cancelled some other way.
pub fn watch_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("Interrupt received");
                    token.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Failed to listen for interrupts"),
            },
            _ = token.cancelled() => {}
        }
    })
}
