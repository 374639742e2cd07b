//! Pipeline tasks for provisioning.

mod asset;
mod extend_disk;

pub use asset::AssetTask;
pub use extend_disk::ExtendDiskTask;

use super::ProvisionContext;
use crate::errors::{BootError, BootResult};
use std::sync::Arc;

/// Shared, read-only context handed to every provisioning task.
pub type ProvisionCtx = Arc<ProvisionContext>;

fn task_start(task_name: &str) {
    tracing::info!(task = task_name, "Provisioning step started");
}

fn log_task_error(task_name: &str, err: &BootError) {
    if err.is_cancelled() {
        tracing::debug!(task = task_name, "Provisioning step cancelled");
    } else {
        tracing::error!(task = task_name, error = %err, "Provisioning step failed");
    }
}

/// Cancellation checkpoint between task steps.
fn checkpoint(ctx: &ProvisionCtx) -> BootResult<()> {
    if ctx.cancel.is_cancelled() {
        return Err(BootError::Cancelled);
    }
    Ok(())
}

/// Run blocking work on the blocking pool.
async fn blocking<T, F>(task_name: &str, f: F) -> BootResult<T>
where
    F: FnOnce() -> BootResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BootError::Internal(format!("{} blocking step panicked: {}", task_name, e)))?
}
