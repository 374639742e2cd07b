//! Fixed resource identifiers and defaults.

/// Remote sources for the boot assets.
pub mod urls {
    /// gzip-compressed kernel image.
    pub const KERNEL: &str = "https://cloud-images.ubuntu.com/releases/focal/release/unpacked/ubuntu-20.04-server-cloudimg-arm64-vmlinuz-generic";

    /// Initial ramdisk.
    pub const INITRD: &str = "https://cloud-images.ubuntu.com/releases/focal/release/unpacked/ubuntu-20.04-server-cloudimg-arm64-initrd-generic";

    /// tar.gz bundle containing the raw root disk image.
    pub const DISK_IMAGE: &str =
        "https://cloud-images.ubuntu.com/releases/focal/release/ubuntu-20.04-server-cloudimg-arm64.tar.gz";
}

/// Local filenames inside the working directory.
pub mod filenames {
    pub const KERNEL: &str = "vmlinuz";
    pub const INITRD: &str = "initrd";
    pub const DISK_IMAGE: &str = "focal-server-cloudimg-arm64.img";
    /// Host side of the guest vsock device.
    pub const VSOCK_SOCKET: &str = "guestboot-vsock.sock";
}

/// Defaults for command-line options.
pub mod defaults {
    pub const COMMAND_LINE: &str = "console=hvc0";
    pub const CPUS: u32 = 2;
    pub const MEMORY_MIB: u64 = 2048;
    /// Disk extension target (20 GiB).
    pub const DISK_SIZE_MIB: u64 = 20480;
}

/// Guest resource bounds enforced by configuration validation.
pub mod limits {
    pub const MIN_MEMORY_MIB: u64 = 128;
    pub const MAX_CPUS: u32 = 64;
}

/// vsock port exposed by the socket device.
pub const VSOCK_PORT: u32 = 1024;

/// Bytes per MiB.
pub const MIB: u64 = 1024 * 1024;
