//! Guest machine configuration.

use crate::constants::{MIB, VSOCK_PORT, limits};
use crate::errors::{BootError, BootResult};
use crate::layout::AssetLayout;
use crate::options::BootOptions;
use crate::terminal::ConsoleAttachment;
use std::path::{Path, PathBuf};

/// Virtual devices attached to the guest.
#[derive(Debug, Clone)]
pub enum Device {
    /// virtio console bound to host descriptors.
    SerialConsole(ConsoleAttachment),
    /// virtio-net behind the engine's NAT.
    NatNetwork,
    /// virtio-rng.
    Entropy,
    /// virtio-blk backed by a raw image.
    Block { path: PathBuf, read_only: bool },
    /// Traditional memory balloon.
    MemoryBalloon,
    /// virtio-vsock exposed on the host as a unix socket.
    Vsock { port: u32, socket_path: PathBuf },
}

/// Everything the engine needs to boot the guest.
#[derive(Debug, Clone)]
pub struct VmConfigSpec {
    pub vcpu_count: u32,
    pub memory_bytes: u64,
    pub kernel_path: PathBuf,
    pub initrd_path: PathBuf,
    pub command_line: String,
    pub disk_path: PathBuf,
    pub devices: Vec<Device>,
}

impl VmConfigSpec {
    /// Standard guest: console, NAT network, entropy, root disk, balloon and vsock.
    pub fn from_options(
        options: &BootOptions,
        layout: &AssetLayout,
        console: ConsoleAttachment,
    ) -> Self {
        let disk_path = layout.disk_path();
        Self {
            vcpu_count: options.cpus,
            memory_bytes: options.memory_mib.saturating_mul(MIB),
            kernel_path: layout.kernel_path(),
            initrd_path: layout.initrd_path(),
            command_line: options.command_line.clone(),
            disk_path: disk_path.clone(),
            devices: vec![
                Device::SerialConsole(console),
                Device::NatNetwork,
                Device::Entropy,
                Device::Block {
                    path: disk_path,
                    read_only: false,
                },
                Device::MemoryBalloon,
                Device::Vsock {
                    port: VSOCK_PORT,
                    socket_path: layout.vsock_socket_path(),
                },
            ],
        }
    }

    pub fn memory_mib(&self) -> u64 {
        self.memory_bytes / MIB
    }

    pub fn console(&self) -> Option<&ConsoleAttachment> {
        self.devices.iter().find_map(|d| match d {
            Device::SerialConsole(c) => Some(c),
            _ => None,
        })
    }

    /// Check the configuration before handing it to an engine.
    pub fn validate(&self) -> BootResult<()> {
        if self.vcpu_count == 0 || self.vcpu_count > limits::MAX_CPUS {
            return Err(BootError::Validation(format!(
                "vcpu count {} outside 1..={}",
                self.vcpu_count,
                limits::MAX_CPUS
            )));
        }
        if self.memory_bytes < limits::MIN_MEMORY_MIB * MIB {
            return Err(BootError::Validation(format!(
                "memory {} MiB below minimum {} MiB",
                self.memory_mib(),
                limits::MIN_MEMORY_MIB
            )));
        }
        if self.command_line.trim().is_empty() {
            return Err(BootError::Validation("kernel command line is empty".into()));
        }

        require_file("kernel", &self.kernel_path)?;
        require_file("initrd", &self.initrd_path)?;
        require_file("disk image", &self.disk_path)?;

        let consoles = self
            .devices
            .iter()
            .filter(|d| matches!(d, Device::SerialConsole(_)))
            .count();
        if consoles != 1 {
            return Err(BootError::Validation(format!(
                "expected exactly one serial console, found {}",
                consoles
            )));
        }

        let blocks: Vec<&PathBuf> = self
            .devices
            .iter()
            .filter_map(|d| match d {
                Device::Block { path, .. } => Some(path),
                _ => None,
            })
            .collect();
        if blocks.len() != 1 || blocks[0] != &self.disk_path {
            return Err(BootError::Validation(
                "expected exactly one block device backed by the disk image".into(),
            ));
        }

        Ok(())
    }
}

fn require_file(what: &str, path: &Path) -> BootResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BootError::Validation(format!(
            "{} not found: {}",
            what,
            path.display()
        )))
    }
}
