//! Error types for guestboot.

use thiserror::Error;

/// Result type alias using guestboot's error type.
pub type BootResult<T> = std::result::Result<T, BootError>;

/// Errors that can occur while provisioning or running a guest.
#[derive(Error, Debug)]
pub enum BootError {
    // Provisioning errors
    /// Network or filesystem failure while downloading an asset.
    #[error("fetch {asset} failed: {message}")]
    Fetch {
        /// Asset being downloaded.
        asset: String,
        /// Underlying cause.
        message: String,
    },

    /// Decompression, extraction or flatten failure.
    #[error("transform {asset} failed: {message}")]
    Transform {
        /// Asset being transformed.
        asset: String,
        /// Underlying cause.
        message: String,
    },

    /// External disk resize command failed.
    #[error("disk extension failed: {0}")]
    Extension(String),

    // Guest lifecycle errors
    /// Guest configuration rejected before start.
    #[error("invalid guest configuration: {0}")]
    Validation(String),

    /// Guest start request failed.
    #[error("guest start failed: {0}")]
    Start(String),

    /// Guest refused or failed to honor a stop request.
    #[error("stop request failed: {0}")]
    StopRequest(String),

    /// Virtualization engine unavailable or misbehaving.
    #[error("virtualization engine error: {0}")]
    Engine(String),

    // Host terminal errors
    /// Pty allocation or terminal mode change failure.
    #[error("terminal error: {0}")]
    Terminal(String),

    /// Invalid options or missing local state.
    #[error("configuration error: {0}")]
    Config(String),

    /// Work aborted because the shared token was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A pipeline step failed; wraps the step's own error.
    #[error("{step}: {source}")]
    Step {
        /// Name of the failing step.
        step: String,
        /// Error reported by the step.
        #[source]
        source: Box<BootError>,
    },

    /// Invariant violated inside guestboot.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BootError {
    /// Create a fetch error for the named asset.
    pub fn fetch(asset: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            asset: asset.into(),
            message: message.to_string(),
        }
    }

    /// Create a transform error for the named asset.
    pub fn transform(asset: impl Into<String>, message: impl ToString) -> Self {
        Self::Transform {
            asset: asset.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an error with the name of the step that produced it.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Step { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_names_asset() {
        let err = BootError::fetch("initrd", "connection reset");
        let msg = err.to_string();
        assert!(msg.contains("initrd"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_step_wrapper_keeps_source_chain() {
        let err = BootError::transform("vmlinuz", "bad gzip header").in_step("kernel");
        assert_eq!(err.to_string(), "kernel: transform vmlinuz failed: bad gzip header");

        let source = std::error::Error::source(&err).expect("step carries a source");
        assert!(source.to_string().contains("bad gzip header"));
    }

    #[test]
    fn test_is_cancelled_sees_through_step() {
        assert!(BootError::Cancelled.in_step("disk_image").is_cancelled());
        assert!(!BootError::Extension("dd exited 1".into()).is_cancelled());
    }
}
