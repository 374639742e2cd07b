//! Virtualization engine seam.
//!
//! The lifecycle controller drives a guest only through [`Hypervisor`]:
//!
//! - **validate**: reject a configuration before any resources exist
//! - **start**: begin booting, reporting the outcome through a callback
//! - **request_stop**: ask the guest to shut down
//! - **state_changes**: stream of state transitions
//! - **take_failure**: why the guest ended, when the engine failed
//!
//! [`vfkit::VfkitHypervisor`] implements it on top of the `vfkit` front-end
//! to Apple's Virtualization.framework.

mod config;
mod state;
pub mod vfkit;

pub use config::{Device, VmConfigSpec};
pub use state::GuestState;

#[cfg(test)]
pub(crate) mod testing;

use crate::errors::{BootError, BootResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Called once when a start request completes.
pub type StartCallback = Box<dyn FnOnce(BootResult<()>) + Send>;

/// Which operations the engine currently allows. Logged on every state change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_start: bool,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_request_stop: bool,
}

/// A virtualization engine running at most one guest.
#[async_trait]
pub trait Hypervisor: Send {
    /// Check `config` against what this engine can run.
    fn validate(&self, config: &VmConfigSpec) -> BootResult<()>;

    /// Start the guest without waiting for it to boot.
    ///
    /// `on_complete` runs once, with the start outcome.
    fn start(&mut self, config: &VmConfigSpec, on_complete: StartCallback);

    /// Ask the guest to stop. Returns whether the engine accepted the request.
    async fn request_stop(&mut self) -> BootResult<bool>;

    /// Receiver of state transitions. Can be taken once.
    fn state_changes(&mut self) -> BootResult<mpsc::UnboundedReceiver<GuestState>>;

    /// Last observed state.
    fn state(&self) -> GuestState;

    /// Last observed capabilities.
    fn capabilities(&self) -> Capabilities;

    /// Why the engine ended the guest on its own, if it failed.
    ///
    /// Checked once the guest has stopped. Returns the failure at most once.
    fn take_failure(&mut self) -> Option<BootError> {
        None
    }
}
