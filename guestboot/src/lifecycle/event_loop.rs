//! Event loop reconciling the three shutdown triggers.

use super::signal::TerminationSignal;
use crate::errors::BootResult;
use crate::vmm::{GuestState, Hypervisor};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long to wait for `Stopped` after an accepted stop request.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

/// Something the event loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The user interrupted the process.
    UserInterrupt,
    /// The caller's token was cancelled.
    CallerCancelled,
    /// The engine reported a new guest state.
    GuestStateChanged(GuestState),
}

/// Single owner of the engine while the guest runs.
///
/// Every exit path fires the shared [`TerminationSignal`]. At most one stop
/// request is issued per run.
pub struct EventLoop {
    hypervisor: Box<dyn Hypervisor>,
    states: mpsc::UnboundedReceiver<GuestState>,
    caller: CancellationToken,
    interrupt: CancellationToken,
    signal: TerminationSignal,
    stop_grace: Duration,
}

impl EventLoop {
    pub fn new(
        hypervisor: Box<dyn Hypervisor>,
        states: mpsc::UnboundedReceiver<GuestState>,
        caller: CancellationToken,
        interrupt: CancellationToken,
        signal: TerminationSignal,
    ) -> Self {
        Self {
            hypervisor,
            states,
            caller,
            interrupt,
            signal,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Next event, or `None` once the engine has dropped its state sender.
    async fn next_event(&mut self) -> Option<LifecycleEvent> {
        tokio::select! {
            _ = self.interrupt.cancelled() => Some(LifecycleEvent::UserInterrupt),
            _ = self.caller.cancelled() => Some(LifecycleEvent::CallerCancelled),
            state = self.states.recv() => state.map(LifecycleEvent::GuestStateChanged),
        }
    }

    fn log_state_change(&self, new_state: GuestState) {
        let caps = self.hypervisor.capabilities();
        tracing::info!(
            new_state = %new_state,
            state = %self.hypervisor.state(),
            can_start = caps.can_start,
            can_resume = caps.can_resume,
            can_pause = caps.can_pause,
            can_request_stop = caps.can_request_stop,
            "Guest state changed"
        );
    }

    /// Run until the guest stops or a stop has been requested.
    ///
    /// Returns the engine's error if the stop request itself fails.
    pub async fn run(mut self) -> BootResult<()> {
        loop {
            let Some(event) = self.next_event().await else {
                tracing::warn!("Engine closed its state stream");
                return self.finish();
            };

            match event {
                LifecycleEvent::UserInterrupt | LifecycleEvent::CallerCancelled => {
                    tracing::info!(trigger = ?event, "Requesting guest stop");
                    let accepted = match self.hypervisor.request_stop().await {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            self.signal.fire();
                            return Err(e);
                        }
                    };
                    tracing::info!(accepted, "Stop request completed");
                    self.signal.fire();
                    if accepted {
                        self.drain_until_stopped().await;
                    }
                    return Ok(());
                }
                LifecycleEvent::GuestStateChanged(state) => {
                    self.log_state_change(state);
                    if state.is_stopped() {
                        return self.finish();
                    }
                }
            }
        }
    }

    /// Fire the signal for a guest that ended on its own, surfacing any
    /// engine failure behind it.
    fn finish(&mut self) -> BootResult<()> {
        self.signal.fire();
        match self.hypervisor.take_failure() {
            Some(e) => {
                tracing::error!(error = %e, "Guest ended with an engine failure");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Keep logging state changes for a while after an accepted stop so the
    /// guest can shut down before the engine is torn down.
    async fn drain_until_stopped(&mut self) {
        let grace = self.stop_grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(state) = self.states.recv().await {
                self.log_state_change(state);
                if state.is_stopped() {
                    return;
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Guest did not report stopped in time");
        }
    }
}
