//! Host terminal raw mode with guaranteed restoration.

use crate::errors::{BootError, BootResult};
use nix::sys::termios::{self, SetArg, Termios};
use std::os::fd::AsFd;

/// Something whose line discipline can be switched to raw and back.
pub trait TerminalModes: Send {
    /// Mode recorded before switching to raw.
    type Saved: Send;

    /// Switch to raw mode and return the previous mode.
    fn enter_raw(&mut self) -> BootResult<Self::Saved>;

    /// Put back a mode returned by [`enter_raw`](Self::enter_raw).
    fn restore(&mut self, saved: Self::Saved) -> BootResult<()>;
}

/// The process's controlling terminal, reached through stdin.
#[derive(Debug, Default)]
pub struct HostTerminal;

impl TerminalModes for HostTerminal {
    type Saved = Termios;

    fn enter_raw(&mut self) -> BootResult<Termios> {
        let stdin = std::io::stdin();
        // SAFETY: isatty only inspects the descriptor.
        if unsafe { libc::isatty(libc::STDIN_FILENO) } != 1 {
            return Err(BootError::Terminal("stdin is not a terminal".into()));
        }

        let original = termios::tcgetattr(stdin.as_fd())
            .map_err(|e| BootError::Terminal(format!("failed to read terminal mode: {}", e)))?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &raw)
            .map_err(|e| BootError::Terminal(format!("failed to enter raw mode: {}", e)))?;

        Ok(original)
    }

    fn restore(&mut self, saved: Termios) -> BootResult<()> {
        let stdin = std::io::stdin();
        termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &saved)
            .map_err(|e| BootError::Terminal(format!("failed to restore terminal mode: {}", e)))
    }
}

/// RAII guard for raw mode.
///
/// The saved mode is put back exactly once: by [`restore`](Self::restore)
/// or, failing that, on drop (including during unwinding).
pub struct RawModeGuard<M: TerminalModes> {
    modes: M,
    saved: Option<M::Saved>,
}

impl<M: TerminalModes> RawModeGuard<M> {
    /// Switch `modes` to raw and start guarding the previous mode.
    pub fn enter(mut modes: M) -> BootResult<Self> {
        let saved = modes.enter_raw()?;
        tracing::debug!("Host terminal switched to raw mode");
        Ok(Self {
            modes,
            saved: Some(saved),
        })
    }

    /// Restore the saved mode now. Later calls do nothing.
    pub fn restore(&mut self) -> BootResult<()> {
        match self.saved.take() {
            Some(saved) => self.modes.restore(saved),
            None => Ok(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }
}

impl<M: TerminalModes> Drop for RawModeGuard<M> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::warn!(error = %e, "Failed to restore host terminal mode");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake terminal that counts transitions.
    #[derive(Clone, Default)]
    pub struct CountingModes {
        pub entered: Arc<AtomicUsize>,
        pub restored: Arc<AtomicUsize>,
        pub fail_enter: bool,
    }

    impl CountingModes {
        pub fn restored(&self) -> usize {
            self.restored.load(Ordering::SeqCst)
        }
    }

    impl TerminalModes for CountingModes {
        type Saved = u32;

        fn enter_raw(&mut self) -> BootResult<u32> {
            if self.fail_enter {
                return Err(BootError::Terminal("not a tty".into()));
            }
            self.entered.fetch_add(1, Ordering::SeqCst);
            Ok(0o644)
        }

        fn restore(&mut self, saved: u32) -> BootResult<()> {
            assert_eq!(saved, 0o644);
            self.restored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
