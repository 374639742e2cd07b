//! Working directory layout for boot assets.
//!
//! ```text
//! <workdir>/
//! ├── vmlinuz                            # decompressed kernel
//! ├── initrd                             # initial ramdisk
//! ├── focal-server-cloudimg-arm64.img    # raw root disk (flattened, extended)
//! └── guestboot-vsock.sock               # vsock host endpoint (while running)
//! ```

use crate::constants::filenames;
use crate::errors::{BootError, BootResult};
use std::path::{Path, PathBuf};

/// Resolves asset paths relative to a working directory.
#[derive(Debug, Clone)]
pub struct AssetLayout {
    workdir: PathBuf,
}

impl AssetLayout {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn kernel_path(&self) -> PathBuf {
        self.workdir.join(filenames::KERNEL)
    }

    pub fn initrd_path(&self) -> PathBuf {
        self.workdir.join(filenames::INITRD)
    }

    pub fn disk_path(&self) -> PathBuf {
        self.workdir.join(filenames::DISK_IMAGE)
    }

    pub fn vsock_socket_path(&self) -> PathBuf {
        self.workdir.join(filenames::VSOCK_SOCKET)
    }

    /// Create the working directory if needed.
    pub fn prepare(&self) -> BootResult<()> {
        std::fs::create_dir_all(&self.workdir).map_err(|e| {
            BootError::Config(format!(
                "Failed to create working directory {}: {}",
                self.workdir.display(),
                e
            ))
        })
    }

    /// Check that every boot asset is already materialized.
    ///
    /// Used when provisioning is skipped.
    pub fn ensure_assets_present(&self) -> BootResult<()> {
        for path in [self.kernel_path(), self.initrd_path(), self.disk_path()] {
            if !path.is_file() {
                return Err(BootError::Config(format!(
                    "Boot asset not found: {} (run with --setup to download it)",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
