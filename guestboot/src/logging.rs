//! Tracing subscriber setup.
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `guestboot=info`).
//! With a log file configured, a second non-ANSI layer writes the same
//! events through a non-blocking appender.

use crate::errors::{BootError, BootResult};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "guestboot=info";

/// Keeps the file appender's worker alive. Hold it until the process exits
/// so buffered lines are flushed.
#[derive(Debug)]
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Appender for `path`, creating its directory. Never rotates.
fn file_appender(path: &Path) -> BootResult<RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BootError::Config(format!("log file {} has no file name", path.display())))?;

    std::fs::create_dir_all(&dir).map_err(|e| {
        BootError::Config(format!("failed to create log directory {}: {}", dir.display(), e))
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(&dir)
        .map_err(|e| BootError::Config(format!("failed to open log file {}: {}", path.display(), e)))
}

/// Install the global subscriber. Call once from `main`.
///
/// Fails only when `log_file` cannot be opened.
pub fn init(log_file: Option<&Path>) -> BootResult<LogGuard> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(path) = log_file else {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .try_init();
        return Ok(LogGuard { _file_guard: None });
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(path)?);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(LogGuard {
        _file_guard: Some(guard),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_path_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let err = init(Some(&blocker.join("guestboot.log"))).unwrap_err();
        assert!(matches!(err, BootError::Config(_)));
        assert!(err.to_string().contains("not-a-dir"));
    }

    #[test]
    fn test_appender_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("guestboot.log");

        file_appender(&path).unwrap();
        assert!(path.is_file());
    }
}
