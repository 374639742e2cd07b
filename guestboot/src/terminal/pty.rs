//! Pseudo-terminal pair allocation and sizing.

use crate::errors::{BootError, BootResult};
use nix::pty::{OpenptyResult, openpty};
use std::os::fd::{AsRawFd, OwnedFd};

/// Master/slave pty pair.
pub struct PtyPair {
    master: OwnedFd,
    slave: OwnedFd,
}

impl PtyPair {
    pub fn open() -> BootResult<Self> {
        let OpenptyResult { master, slave } = openpty(None, None)
            .map_err(|e| BootError::Terminal(format!("failed to open pty: {}", e)))?;
        Ok(Self { master, slave })
    }

    pub fn master(&self) -> &OwnedFd {
        &self.master
    }

    pub fn slave(&self) -> &OwnedFd {
        &self.slave
    }

    /// Set the window size seen by the slave side.
    pub fn resize(&self, cols: u16, rows: u16) -> BootResult<()> {
        let winsize = libc::winsize {
            ws_col: cols,
            ws_row: rows,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: TIOCSWINSZ reads a winsize from a valid pointer.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &winsize) };
        if ret < 0 {
            return Err(BootError::Terminal(format!(
                "failed to resize pty: {}",
                std::io::Error::last_os_error()
            )));
        }

        tracing::debug!(cols, rows, "Pty resized");
        Ok(())
    }
}

/// Host terminal dimensions as `(cols, rows)`, if stdout is a terminal.
pub fn host_dimensions() -> Option<(u16, u16)> {
    term_size::dimensions()
        .map(|(w, h)| (w.min(u16::MAX as usize) as u16, h.min(u16::MAX as usize) as u16))
}
