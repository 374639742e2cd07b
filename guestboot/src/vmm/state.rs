//! Guest run states as reported by the engine.

use std::fmt;

/// Observed guest state.
///
/// Only [`Stopped`](Self::Stopped) drives control flow; the rest are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuestState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Paused,
    Pausing,
    Resuming,
    Error,
}

impl GuestState {
    pub fn is_stopped(self) -> bool {
        self == GuestState::Stopped
    }

    /// Parse an engine state name such as `VirtualMachineStateRunning` or
    /// `Running`.
    pub fn parse(name: &str) -> Option<Self> {
        let short = name.strip_prefix("VirtualMachineState").unwrap_or(name);
        let state = match short {
            "Starting" => GuestState::Starting,
            "Running" => GuestState::Running,
            "Stopping" => GuestState::Stopping,
            "Stopped" => GuestState::Stopped,
            "Paused" => GuestState::Paused,
            "Pausing" => GuestState::Pausing,
            "Resuming" => GuestState::Resuming,
            "Error" => GuestState::Error,
            _ => return None,
        };
        Some(state)
    }
}

impl fmt::Display for GuestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuestState::NotStarted => "not-started",
            GuestState::Starting => "starting",
            GuestState::Running => "running",
            GuestState::Stopping => "stopping",
            GuestState::Stopped => "stopped",
            GuestState::Paused => "paused",
            GuestState::Pausing => "pausing",
            GuestState::Resuming => "resuming",
            GuestState::Error => "error",
        };
        f.write_str(name)
    }
}
