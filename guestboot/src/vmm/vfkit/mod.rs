//! [`Hypervisor`] backed by a `vfkit` child process.
//!
//! ```text
//! VfkitHypervisor::start()
//!   └─► monitor task
//!         ├─► spawn vfkit (stdin/stdout = console endpoints)
//!         ├─► on_complete(Ok | Err)
//!         └─► loop { child exit → [Error →] Stopped; every 500ms GET /vm/state }
//! request_stop() ──► PUT /vm/state {"state":"Stop"}
//! ```

mod command;
mod rest;

pub use command::{find_vfkit, vfkit_args};
pub use rest::{RestClient, StateReport};

use crate::errors::{BootError, BootResult};
use crate::vmm::{Capabilities, GuestState, Hypervisor, StartCallback, VmConfigSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait for vfkit's stderr to drain after it exits.
const STDERR_DRAIN: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Observed {
    state: GuestState,
    capabilities: Capabilities,
    /// A stop request was accepted; a non-zero exit after it is expected.
    stop_accepted: bool,
    failure: Option<String>,
}

/// Shared view of the guest, written by the monitor task.
#[derive(Clone)]
struct StatePublisher {
    observed: Arc<Mutex<Observed>>,
    tx: mpsc::UnboundedSender<GuestState>,
}

impl StatePublisher {
    /// Record a new observation and forward the state if it changed.
    fn publish(&self, state: GuestState, capabilities: Capabilities) {
        let changed = {
            let mut observed = self.observed.lock();
            observed.capabilities = capabilities;
            let changed = observed.state != state;
            observed.state = state;
            changed
        };
        if changed {
            // Nobody listening is fine.
            let _ = self.tx.send(state);
        }
    }

    /// Record how vfkit exited and report the guest as stopped.
    ///
    /// A failed exit not preceded by an accepted stop is kept as the run's
    /// failure and reported as `Error` first.
    fn publish_exit(&self, failure: Option<String>) {
        let failure = {
            let mut observed = self.observed.lock();
            match failure {
                Some(_) if observed.stop_accepted => None,
                Some(message) => {
                    observed.failure = Some(message.clone());
                    Some(message)
                }
                None => None,
            }
        };
        if let Some(message) = failure {
            tracing::error!(reason = %message, "vfkit failed");
            self.publish(GuestState::Error, Capabilities::default());
        }
        self.publish(GuestState::Stopped, Capabilities::default());
    }
}

pub struct VfkitHypervisor {
    binary: Option<PathBuf>,
    rest_port: u16,
    rest: RestClient,
    publisher: StatePublisher,
    state_rx: Option<mpsc::UnboundedReceiver<GuestState>>,
    monitor: Option<JoinHandle<()>>,
}

impl VfkitHypervisor {
    /// Engine using the `vfkit` found on `PATH`, with a free local port for
    /// its REST endpoint.
    pub fn new() -> BootResult<Self> {
        let rest_port = free_local_port()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            binary: None,
            rest_port,
            rest: RestClient::new(rest_port)?,
            publisher: StatePublisher {
                observed: Arc::new(Mutex::new(Observed::default())),
                tx,
            },
            state_rx: Some(rx),
            monitor: None,
        })
    }

    /// Use a specific `vfkit` binary instead of searching for one.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    fn resolve_binary(&self) -> BootResult<PathBuf> {
        match &self.binary {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(BootError::Engine(format!(
                "vfkit binary not found: {}",
                path.display()
            ))),
            None => find_vfkit(),
        }
    }

    fn build_command(&self, binary: &Path, config: &VmConfigSpec) -> BootResult<Command> {
        let console = config
            .console()
            .ok_or_else(|| BootError::Start("configuration has no serial console".into()))?;
        let stdin = console
            .input
            .try_clone()
            .map_err(|e| BootError::Start(format!("failed to duplicate console input: {}", e)))?;
        let stdout = console
            .output
            .try_clone()
            .map_err(|e| BootError::Start(format!("failed to duplicate console output: {}", e)))?;

        let mut cmd = Command::new(binary);
        cmd.args(vfkit_args(config, self.rest_port))
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

fn free_local_port() -> BootResult<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| BootError::Engine(format!("failed to reserve REST port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| BootError::Engine(format!("failed to reserve REST port: {}", e)))?
        .port();
    Ok(port)
}

/// Forward vfkit's own diagnostics into our log. The task yields the last
/// non-empty line.
fn forward_stderr(child: &mut Child) -> Option<JoinHandle<Option<String>>> {
    let stderr = child.stderr.take()?;
    Some(tokio::spawn(async move {
        let mut last = None;
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "guestboot::vfkit", "{}", line);
            if !line.trim().is_empty() {
                last = Some(line);
            }
        }
        last
    }))
}

/// Failure message for a vfkit exit, or `None` for a clean one.
fn exit_failure(
    status: std::io::Result<std::process::ExitStatus>,
    stderr_tail: Option<String>,
) -> Option<String> {
    let reason = match status {
        Ok(status) if status.success() => {
            tracing::info!(exit_status = %status, "vfkit exited");
            return None;
        }
        Ok(status) => format!("vfkit exited with {}", status),
        Err(e) => format!("failed to wait for vfkit: {}", e),
    };
    Some(match stderr_tail {
        Some(tail) => format!("{}: {}", reason, tail),
        None => reason,
    })
}

/// Watch the child until it exits, polling the REST endpoint meanwhile.
async fn monitor(
    mut child: Child,
    stderr: Option<JoinHandle<Option<String>>>,
    rest: RestClient,
    publisher: StatePublisher,
) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            status = child.wait() => {
                let stderr_tail = match stderr {
                    Some(handle) => tokio::time::timeout(STDERR_DRAIN, handle)
                        .await
                        .ok()
                        .and_then(|joined| joined.ok())
                        .flatten(),
                    None => None,
                };
                publisher.publish_exit(exit_failure(status, stderr_tail));
                return;
            }
            _ = ticker.tick() => {
                match rest.state().await {
                    Ok(report) => match report.guest_state() {
                        Some(state) => publisher.publish(state, report.capabilities()),
                        None => tracing::debug!(state = %report.state, "Unrecognized vfkit state"),
                    },
                    // The endpoint comes up a little after the process.
                    Err(e) => tracing::trace!(error = %e, "State poll failed"),
                }
            }
        }
    }
}

#[async_trait]
impl Hypervisor for VfkitHypervisor {
    fn validate(&self, config: &VmConfigSpec) -> BootResult<()> {
        config.validate()?;
        let binary = self.resolve_binary()?;
        tracing::debug!(binary = %binary.display(), "Using vfkit");
        Ok(())
    }

    fn start(&mut self, config: &VmConfigSpec, on_complete: StartCallback) {
        let command = self
            .resolve_binary()
            .and_then(|binary| self.build_command(&binary, config));
        let mut command = match command {
            Ok(command) => command,
            Err(e) => {
                on_complete(Err(e));
                return;
            }
        };

        self.publisher
            .publish(GuestState::Starting, Capabilities::default());

        let rest = self.rest.clone();
        let publisher = self.publisher.clone();
        let rest_port = self.rest_port;
        self.monitor = Some(tokio::spawn(async move {
            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    publisher.publish(GuestState::Error, Capabilities::default());
                    on_complete(Err(BootError::Start(format!("failed to spawn vfkit: {}", e))));
                    return;
                }
            };
            tracing::info!(pid = child.id(), rest_port, "vfkit started");
            let stderr = forward_stderr(&mut child);
            on_complete(Ok(()));

            monitor(child, stderr, rest, publisher).await;
        }));
    }

    async fn request_stop(&mut self) -> BootResult<bool> {
        let accepted = self.rest.request_stop().await?;
        if accepted {
            self.publisher.observed.lock().stop_accepted = true;
        }
        Ok(accepted)
    }

    fn state_changes(&mut self) -> BootResult<mpsc::UnboundedReceiver<GuestState>> {
        self.state_rx
            .take()
            .ok_or_else(|| BootError::Internal("state change receiver already taken".into()))
    }

    fn state(&self) -> GuestState {
        self.publisher.observed.lock().state
    }

    fn capabilities(&self) -> Capabilities {
        self.publisher.observed.lock().capabilities
    }

    fn take_failure(&mut self) -> Option<BootError> {
        self.publisher
            .observed
            .lock()
            .failure
            .take()
            .map(BootError::Engine)
    }
}

impl Drop for VfkitHypervisor {
    fn drop(&mut self) {
        // Dropping the child inside the task kills vfkit.
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Controller;
    use crate::options::BootOptions;
    use crate::vmm::testing::{pipe_console, stub_layout};
    use std::os::unix::fs::PermissionsExt;
    use tokio_util::sync::CancellationToken;

    fn config(dir: &std::path::Path) -> VmConfigSpec {
        let layout = stub_layout(dir);
        VmConfigSpec::from_options(&BootOptions::default(), &layout, pipe_console())
    }

    /// Executable standing in for vfkit that runs `body` and exits.
    fn fake_vfkit(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("vfkit");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_validate_requires_binary() {
        let dir = tempfile::tempdir().unwrap();
        let hv = VfkitHypervisor::new()
            .unwrap()
            .with_binary(dir.path().join("missing-vfkit"));
        let err = hv.validate(&config(dir.path())).unwrap_err();
        assert!(matches!(err, BootError::Engine(_)));
    }

    #[test]
    fn test_state_receiver_taken_once() {
        let mut hv = VfkitHypervisor::new().unwrap();
        assert_eq!(hv.state(), GuestState::NotStarted);
        assert!(hv.state_changes().is_ok());
        assert!(hv.state_changes().is_err());
    }

    #[tokio::test]
    async fn test_child_exit_reports_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut hv = VfkitHypervisor::new()
            .unwrap()
            .with_binary(fake_vfkit(dir.path(), "exit 0"));
        hv.validate(&config).unwrap();
        let mut states = hv.state_changes().unwrap();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        hv.start(
            &config,
            Box::new(move |result| {
                let _ = done_tx.send(result.is_ok());
            }),
        );
        assert!(done_rx.await.unwrap());

        assert_eq!(states.recv().await, Some(GuestState::Starting));
        let last = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match states.recv().await {
                    Some(GuestState::Stopped) | None => return hv.state(),
                    Some(_) => continue,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(last, GuestState::Stopped);
        assert!(hv.take_failure().is_none());
    }

    #[tokio::test]
    async fn test_failed_exit_reports_error_then_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut hv = VfkitHypervisor::new().unwrap().with_binary(fake_vfkit(
            dir.path(),
            "echo 'missing com.apple.security.virtualization entitlement' >&2\nexit 3",
        ));
        let mut states = hv.state_changes().unwrap();
        hv.start(&config, Box::new(|_: BootResult<()>| {}));

        let seen = tokio::time::timeout(Duration::from_secs(10), async {
            let mut seen = Vec::new();
            while let Some(state) = states.recv().await {
                seen.push(state);
                if state.is_stopped() {
                    break;
                }
            }
            seen
        })
        .await
        .unwrap();
        assert_eq!(
            &seen[seen.len() - 2..],
            [GuestState::Error, GuestState::Stopped]
        );

        let err = hv.take_failure().unwrap();
        assert!(matches!(err, BootError::Engine(_)));
        assert!(err.to_string().contains("entitlement"));
        assert!(hv.take_failure().is_none());
    }

    #[tokio::test]
    async fn test_failed_exit_fails_controller_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let hv = VfkitHypervisor::new()
            .unwrap()
            .with_binary(fake_vfkit(dir.path(), "echo 'bad device' >&2\nexit 3"));

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            Controller::new(Box::new(hv)).run(
                &config,
                CancellationToken::new(),
                CancellationToken::new(),
            ),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(err, BootError::Engine(_)));
        assert!(err.to_string().contains("bad device"));
    }
}
