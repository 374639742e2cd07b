//! Terminal bridge between the guest console and the host terminal.
//!
//! ```text
//! host stdin ─────────────────────────────► guest console input
//! guest console output ─► pty slave ─► pty master ─► relay thread ─► host stdout
//! ```
//!
//! [`TerminalSession::open`] allocates the pty, switches the host terminal to
//! raw mode, copies the host window size onto the pty and starts the relay.
//! Closing or dropping the session restores the host mode first and then
//! releases both pty ends.

mod pty;
mod raw_mode;
mod relay;

pub use pty::{PtyPair, host_dimensions};
pub use raw_mode::{HostTerminal, RawModeGuard, TerminalModes};
pub use relay::{ReadErrorClass, RelayExit, RelayOutcome, classify_read_error, relay, spawn_relay};

#[cfg(test)]
pub(crate) use raw_mode::testing;

use crate::errors::{BootError, BootResult};
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Descriptors the guest console device reads from and writes to.
#[derive(Debug, Clone)]
pub struct ConsoleAttachment {
    /// Guest reads its console input from here.
    pub input: Arc<OwnedFd>,
    /// Guest writes its console output here.
    pub output: Arc<OwnedFd>,
}

impl ConsoleAttachment {
    pub fn new(input: OwnedFd, output: OwnedFd) -> Self {
        Self {
            input: Arc::new(input),
            output: Arc::new(output),
        }
    }
}

/// A live bridge between the guest console and the host terminal.
pub struct TerminalSession<M: TerminalModes = HostTerminal> {
    raw_mode: Option<RawModeGuard<M>>,
    pty: Option<PtyPair>,
    input: Arc<OwnedFd>,
    relay: Option<JoinHandle<RelayOutcome>>,
}

impl TerminalSession<HostTerminal> {
    /// Bridge the process's own terminal.
    pub fn open() -> BootResult<Self> {
        Self::open_with(HostTerminal, std::io::stdout())
    }
}

impl<M: TerminalModes> TerminalSession<M> {
    /// Open a session whose mode changes go through `modes` and whose guest
    /// output is copied to `out`.
    pub fn open_with<W>(modes: M, out: W) -> BootResult<Self>
    where
        W: Write + Send + 'static,
    {
        let pty = PtyPair::open()?;
        let input = std::io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|e| BootError::Terminal(format!("failed to duplicate stdin: {}", e)))?;

        let raw_mode = RawModeGuard::enter(modes)?;

        if let Some((cols, rows)) = host_dimensions() {
            pty.resize(cols, rows)?;
        }

        let reader = pty
            .master()
            .try_clone()
            .map_err(|e| BootError::Terminal(format!("failed to duplicate pty master: {}", e)))?;
        let relay = spawn_relay(File::from(reader), out)?;

        tracing::debug!("Terminal session opened");
        Ok(Self {
            raw_mode: Some(raw_mode),
            pty: Some(pty),
            input: Arc::new(input),
            relay: Some(relay),
        })
    }

    /// Endpoints for the guest console device.
    pub fn attach(&self) -> BootResult<ConsoleAttachment> {
        let pty = self
            .pty
            .as_ref()
            .ok_or_else(|| BootError::Terminal("terminal session already closed".into()))?;
        let output = pty
            .slave()
            .try_clone()
            .map_err(|e| BootError::Terminal(format!("failed to duplicate pty slave: {}", e)))?;
        Ok(ConsoleAttachment {
            input: Arc::clone(&self.input),
            output: Arc::new(output),
        })
    }

    /// Restore the host terminal, then release the pty.
    ///
    /// The relay thread is left to end on its own once every copy of the
    /// slave side is closed.
    pub fn close(mut self) -> BootResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> BootResult<()> {
        let restored = match self.raw_mode.take() {
            Some(mut guard) => guard.restore(),
            None => Ok(()),
        };
        self.pty.take();
        self.relay.take();
        restored
    }
}

impl<M: TerminalModes> Drop for TerminalSession<M> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Terminal session teardown failed");
        }
    }
}
