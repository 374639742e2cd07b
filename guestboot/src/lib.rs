//! guestboot: provision boot assets and run a Linux guest with an interactive console.
//!
//! ```text
//! boot()
//!   ├── provision()        fetch + transform kernel/initrd/disk, extend disk
//!   ├── TerminalSession    pty pair bridged to the host terminal
//!   └── Controller::run()  validate, start, event loop, single termination
//! ```

pub mod boot;
pub mod constants;
pub mod errors;
pub mod layout;
pub mod lifecycle;
pub mod logging;
pub mod options;
pub mod pipeline;
pub mod provision;
pub mod terminal;
pub mod vmm;

pub use boot::boot;
pub use errors::{BootError, BootResult};
pub use layout::AssetLayout;
pub use options::BootOptions;
