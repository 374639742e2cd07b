//! Guest lifecycle: start, run, and a single coordinated termination.
//!
//! ```text
//!  ctrl-c ──► interrupt token ─┐
//!  caller token ───────────────┼──► EventLoop ──► request_stop (at most once)
//!  engine state changes ───────┘        │
//!                                       └──► TerminationSignal::fire ──► Controller::run returns
//! ```

mod controller;
mod event_loop;
mod interrupt;
mod signal;

pub use controller::Controller;
pub use event_loop::{DEFAULT_STOP_GRACE, EventLoop, LifecycleEvent};
pub use interrupt::watch_interrupt;
pub use signal::TerminationSignal;
