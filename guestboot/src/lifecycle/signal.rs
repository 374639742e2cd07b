//! One-shot termination signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Pending until fired once; every later `fire` is a no-op.
///
/// Clones share the same signal. Any clone may fire or wait.
#[derive(Debug, Clone, Default)]
pub struct TerminationSignal {
    fired: Arc<AtomicBool>,
    token: CancellationToken,
}

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        let first = self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.token.cancel();
        }
        first
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolve once the signal has fired.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}
