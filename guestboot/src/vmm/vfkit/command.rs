//! `vfkit` command line construction and binary lookup.

use crate::errors::{BootError, BootResult};
use crate::vmm::{Device, VmConfigSpec};
use std::path::PathBuf;

const INSTALL_LOCATIONS: &[&str] = &["/opt/homebrew/bin/vfkit", "/usr/local/bin/vfkit"];

/// Find the `vfkit` binary on `PATH` or in the usual Homebrew locations.
pub fn find_vfkit() -> BootResult<PathBuf> {
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join("vfkit");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    INSTALL_LOCATIONS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .ok_or_else(|| {
            BootError::Engine(
                "vfkit binary not found on PATH (install it with: brew install vfkit)".into(),
            )
        })
}

fn device_arg(device: &Device) -> String {
    match device {
        // The child's stdin/stdout are bound to the console endpoints.
        Device::SerialConsole(_) => "virtio-serial,stdio".to_string(),
        Device::NatNetwork => "virtio-net,nat".to_string(),
        Device::Entropy => "virtio-rng".to_string(),
        Device::Block { path, read_only } => {
            let mut arg = format!("virtio-blk,path={}", path.display());
            if *read_only {
                arg.push_str(",readonly");
            }
            arg
        }
        Device::MemoryBalloon => "virtio-balloon".to_string(),
        Device::Vsock { port, socket_path } => format!(
            "virtio-vsock,port={},socketURL={}",
            port,
            socket_path.display()
        ),
    }
}

/// Arguments for a `vfkit` run of `config`, with its REST endpoint on
/// `rest_port`.
pub fn vfkit_args(config: &VmConfigSpec, rest_port: u16) -> Vec<String> {
    let mut args = vec![
        "--bootloader".to_string(),
        format!(
            "linux,kernel={},initrd={},cmdline={}",
            config.kernel_path.display(),
            config.initrd_path.display(),
            config.command_line
        ),
        "--cpus".to_string(),
        config.vcpu_count.to_string(),
        "--memory".to_string(),
        config.memory_mib().to_string(),
    ];

    for device in &config.devices {
        args.push("--device".to_string());
        args.push(device_arg(device));
    }

    args.push("--restful-uri".to_string());
    args.push(format!("tcp://localhost:{}", rest_port));
    args
}
