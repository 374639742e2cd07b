//! Test doubles for the engine seam.

use super::{Capabilities, GuestState, Hypervisor, StartCallback, VmConfigSpec};
use crate::errors::{BootError, BootResult};
use crate::layout::AssetLayout;
use crate::terminal::ConsoleAttachment;
use async_trait::async_trait;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Console attachment over a socket pair, for tests that never read it.
pub fn pipe_console() -> ConsoleAttachment {
    let (input, output) = UnixStream::pair().unwrap();
    ConsoleAttachment::new(OwnedFd::from(input), OwnedFd::from(output))
}

/// Layout with small stub assets in place.
pub fn stub_layout(dir: &Path) -> AssetLayout {
    let layout = AssetLayout::new(dir);
    std::fs::write(layout.kernel_path(), b"kernel").unwrap();
    std::fs::write(layout.initrd_path(), b"initrd").unwrap();
    std::fs::write(layout.disk_path(), b"disk").unwrap();
    layout
}

/// Counters shared between a [`FakeHypervisor`] and the test holding it.
#[derive(Clone, Default)]
pub struct Probe {
    pub validations: Arc<AtomicUsize>,
    pub starts: Arc<AtomicUsize>,
    pub stop_requests: Arc<AtomicUsize>,
}

impl Probe {
    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }
}

/// How the fake answers a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBehavior {
    /// Accept and report `Stopped` shortly after.
    Accept,
    /// Report that the guest declined.
    Decline,
    /// Fail the request.
    Fail,
}

pub struct FakeHypervisor {
    pub probe: Probe,
    pub tx: mpsc::UnboundedSender<GuestState>,
    pub rx: Option<mpsc::UnboundedReceiver<GuestState>>,
    pub stop_behavior: StopBehavior,
    pub fail_validate: bool,
    pub fail_start: bool,
    /// Reported once through `take_failure`.
    pub failure: Option<String>,
    pub state: GuestState,
}

impl Default for FakeHypervisor {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            probe: Probe::default(),
            tx,
            rx: Some(rx),
            stop_behavior: StopBehavior::Accept,
            fail_validate: false,
            fail_start: false,
            failure: None,
            state: GuestState::NotStarted,
        }
    }
}

impl FakeHypervisor {
    /// Handle for injecting state changes.
    pub fn states(&self) -> mpsc::UnboundedSender<GuestState> {
        self.tx.clone()
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    fn validate(&self, config: &VmConfigSpec) -> BootResult<()> {
        self.probe.validations.fetch_add(1, Ordering::SeqCst);
        if self.fail_validate {
            return Err(BootError::Validation("unsupported device".into()));
        }
        config.validate()
    }

    fn start(&mut self, _config: &VmConfigSpec, on_complete: StartCallback) {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            self.state = GuestState::Error;
            on_complete(Err(BootError::Start("engine refused".into())));
            return;
        }
        self.state = GuestState::Starting;
        let _ = self.tx.send(GuestState::Starting);
        on_complete(Ok(()));
    }

    async fn request_stop(&mut self) -> BootResult<bool> {
        self.probe.stop_requests.fetch_add(1, Ordering::SeqCst);
        match self.stop_behavior {
            StopBehavior::Accept => {
                self.state = GuestState::Stopping;
                let _ = self.tx.send(GuestState::Stopping);
                let _ = self.tx.send(GuestState::Stopped);
                Ok(true)
            }
            StopBehavior::Decline => Ok(false),
            StopBehavior::Fail => Err(BootError::StopRequest("guest not responding".into())),
        }
    }

    fn state_changes(&mut self) -> BootResult<mpsc::UnboundedReceiver<GuestState>> {
        self.rx
            .take()
            .ok_or_else(|| BootError::Internal("state change receiver already taken".into()))
    }

    fn state(&self) -> GuestState {
        self.state
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_request_stop: self.state == GuestState::Starting,
            ..Default::default()
        }
    }

    fn take_failure(&mut self) -> Option<BootError> {
        self.failure.take().map(BootError::Engine)
    }
}
