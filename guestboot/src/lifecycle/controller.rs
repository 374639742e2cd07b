//! Guest run from validation to termination.

use super::event_loop::{DEFAULT_STOP_GRACE, EventLoop};
use super::signal::TerminationSignal;
use crate::errors::{BootError, BootResult};
use crate::vmm::{Hypervisor, VmConfigSpec};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Drives one guest through an engine.
pub struct Controller {
    hypervisor: Box<dyn Hypervisor>,
    stop_grace: Duration,
}

impl Controller {
    pub fn new(hypervisor: Box<dyn Hypervisor>) -> Self {
        Self {
            hypervisor,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Validate `config`, start the guest and wait for termination.
    ///
    /// `caller` and `interrupt` both lead to a single stop request. Returns
    /// once the termination signal has fired and the event loop has ended.
    pub async fn run(
        self,
        config: &VmConfigSpec,
        caller: CancellationToken,
        interrupt: CancellationToken,
    ) -> BootResult<()> {
        let Controller {
            mut hypervisor,
            stop_grace,
        } = self;

        hypervisor.validate(config)?;
        tracing::info!(
            vcpus = config.vcpu_count,
            memory_mib = config.memory_mib(),
            devices = config.devices.len(),
            "Guest configuration validated"
        );

        // Subscribe before starting so no transition is missed.
        let states = hypervisor.state_changes()?;

        let (started_tx, started_rx) = oneshot::channel();
        hypervisor.start(
            config,
            Box::new(move |result: BootResult<()>| {
                match &result {
                    Ok(()) => tracing::info!("Guest start completed"),
                    Err(e) => tracing::error!(error = %e, "Guest start failed"),
                }
                let _ = started_tx.send(result);
            }),
        );

        let signal = TerminationSignal::new();
        let event_loop = EventLoop::new(hypervisor, states, caller, interrupt, signal.clone())
            .with_stop_grace(stop_grace);
        let handle = tokio::spawn(event_loop.run());

        tokio::select! {
            _ = signal.wait() => {}
            Ok(Err(e)) = started_rx => {
                signal.fire();
                handle.abort();
                return Err(e);
            }
        }

        handle
            .await
            .map_err(|e| BootError::Internal(format!("event loop task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BootOptions;
    use crate::vmm::GuestState;
    use crate::vmm::testing::{FakeHypervisor, StopBehavior, pipe_console, stub_layout};

    fn config(dir: &std::path::Path) -> VmConfigSpec {
        VmConfigSpec::from_options(&BootOptions::default(), &stub_layout(dir), pipe_console())
    }

    #[tokio::test]
    async fn test_validation_failure_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeHypervisor {
            fail_validate: true,
            ..Default::default()
        };
        let probe = fake.probe.clone();

        let err = Controller::new(Box::new(fake))
            .run(
                &config(dir.path()),
                CancellationToken::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BootError::Validation(_)));
        assert_eq!(probe.validations(), 1);
        assert_eq!(probe.starts(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeHypervisor {
            fail_start: true,
            ..Default::default()
        };

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            Controller::new(Box::new(fake)).run(
                &config(dir.path()),
                CancellationToken::new(),
                CancellationToken::new(),
            ),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, BootError::Start(_)));
    }

    #[tokio::test]
    async fn test_guest_stopping_ends_run() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeHypervisor::default();
        let probe = fake.probe.clone();
        let states = fake.states();
        states.send(GuestState::Running).unwrap();
        states.send(GuestState::Stopped).unwrap();

        Controller::new(Box::new(fake))
            .run(
                &config(dir.path()),
                CancellationToken::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(probe.starts(), 1);
        assert_eq!(probe.stop_requests(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_stops_guest() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeHypervisor {
            stop_behavior: StopBehavior::Accept,
            ..Default::default()
        };
        let probe = fake.probe.clone();
        let interrupt = CancellationToken::new();
        interrupt.cancel();

        Controller::new(Box::new(fake))
            .with_stop_grace(Duration::from_millis(200))
            .run(&config(dir.path()), CancellationToken::new(), interrupt)
            .await
            .unwrap();

        assert_eq!(probe.stop_requests(), 1);
    }
}
