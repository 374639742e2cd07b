//! Copy loop from the pty master to the host terminal.
//!
//! ```text
//!            ┌──────── Transient (EAGAIN, EINTR) ────────┐
//!            ▼                                           │
//!   ──► Reading ──► Ok(n) ──► write_all ──► Reading      │
//!            │                                           │
//!            ├──► Ok(0) ──────────────────► Finished(Eof)│
//!            └──► Err(e) ─ classify ─ Terminal ─► Finished(Failed)
//! ```

use crate::errors::{BootError, BootResult};
use std::io::{self, Read, Write};
use std::thread::JoinHandle;
use std::time::Duration;

const BUFFER_SIZE: usize = 8192;

/// Pause before re-reading after a would-block result.
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// How the copy loop treats a read error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadErrorClass {
    /// Retry the read.
    Transient,
    /// Stop the loop.
    Terminal,
}

/// Classify a read error from the pty master.
pub fn classify_read_error(err: &io::Error) -> ReadErrorClass {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => ReadErrorClass::Transient,
        _ if err.raw_os_error() == Some(libc::EAGAIN) => ReadErrorClass::Transient,
        _ => ReadErrorClass::Terminal,
    }
}

/// Why the copy loop ended.
#[derive(Debug)]
pub enum RelayExit {
    /// The reader reported end of stream.
    Eof,
    /// A read or write failed with a non-transient error.
    Failed(io::Error),
}

#[derive(Debug)]
pub struct RelayOutcome {
    pub bytes: u64,
    pub exit: RelayExit,
}

/// Copy `reader` to `writer` until end of stream or a terminal error.
pub fn relay<R: Read, W: Write>(mut reader: R, mut writer: W) -> RelayOutcome {
    let mut buf = [0u8; BUFFER_SIZE];
    let mut bytes = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                return RelayOutcome {
                    bytes,
                    exit: RelayExit::Eof,
                };
            }
            Ok(n) => n,
            Err(e) => match classify_read_error(&e) {
                ReadErrorClass::Transient => {
                    if e.kind() != io::ErrorKind::Interrupted {
                        std::thread::sleep(RETRY_BACKOFF);
                    }
                    continue;
                }
                ReadErrorClass::Terminal => {
                    return RelayOutcome {
                        bytes,
                        exit: RelayExit::Failed(e),
                    };
                }
            },
        };

        if let Err(e) = writer.write_all(&buf[..n]).and_then(|_| writer.flush()) {
            return RelayOutcome {
                bytes,
                exit: RelayExit::Failed(e),
            };
        }
        bytes += n as u64;
    }
}

/// Run [`relay`] on a dedicated thread, logging how it ended.
pub fn spawn_relay<R, W>(reader: R, writer: W) -> BootResult<JoinHandle<RelayOutcome>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    std::thread::Builder::new()
        .name("console-relay".into())
        .spawn(move || {
            let outcome = relay(reader, writer);
            match &outcome.exit {
                RelayExit::Eof => {
                    tracing::debug!(bytes = outcome.bytes, "Console relay reached end of stream")
                }
                RelayExit::Failed(e) => {
                    tracing::info!(bytes = outcome.bytes, error = %e, "Console relay stopped")
                }
            }
            outcome
        })
        .map_err(|e| BootError::Terminal(format!("failed to start console relay: {}", e)))
}
