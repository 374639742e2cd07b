//! Command-line options.

use crate::constants::{defaults, limits};
use crate::errors::{BootError, BootResult};
use clap::Args;
use std::path::PathBuf;

/// Options controlling provisioning and the guest's resources.
#[derive(Args, Debug, Clone)]
pub struct BootOptions {
    /// Kernel command line passed to the guest
    #[arg(short = 'c', long = "command", default_value = defaults::COMMAND_LINE)]
    pub command_line: String,

    /// Download and prepare the boot assets before booting
    #[arg(short = 's', long)]
    pub setup: bool,

    /// Number of virtual CPUs
    #[arg(long, default_value_t = defaults::CPUS)]
    pub cpus: u32,

    /// Guest memory in MiB
    #[arg(long = "memory", value_name = "MIB", default_value_t = defaults::MEMORY_MIB)]
    pub memory_mib: u64,

    /// Size the root disk is extended to during setup, in MiB
    #[arg(long = "disk-size", value_name = "MIB", default_value_t = defaults::DISK_SIZE_MIB)]
    pub disk_size_mib: u64,

    /// Directory holding the boot assets
    #[arg(short = 'w', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            command_line: defaults::COMMAND_LINE.to_string(),
            setup: false,
            cpus: defaults::CPUS,
            memory_mib: defaults::MEMORY_MIB,
            disk_size_mib: defaults::DISK_SIZE_MIB,
            workdir: PathBuf::from("."),
            log_file: None,
        }
    }
}

impl BootOptions {
    /// Reject option combinations that can never produce a bootable guest.
    pub fn sanitize(&self) -> BootResult<()> {
        if self.cpus == 0 {
            return Err(BootError::Config("cpus must be at least 1".into()));
        }
        if self.cpus > limits::MAX_CPUS {
            return Err(BootError::Config(format!(
                "cpus must be at most {}, got {}",
                limits::MAX_CPUS,
                self.cpus
            )));
        }
        if self.memory_mib < limits::MIN_MEMORY_MIB {
            return Err(BootError::Config(format!(
                "memory must be at least {} MiB, got {}",
                limits::MIN_MEMORY_MIB,
                self.memory_mib
            )));
        }
        if self.command_line.trim().is_empty() {
            return Err(BootError::Config("kernel command line is empty".into()));
        }
        if self.disk_size_mib == 0 {
            return Err(BootError::Config("disk size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        options: BootOptions,
    }

    #[test]
    fn test_defaults_from_empty_command_line() {
        let cli = TestCli::try_parse_from(["guestboot"]).unwrap();
        let opts = cli.options;
        assert_eq!(opts.command_line, "console=hvc0");
        assert!(!opts.setup);
        assert_eq!(opts.cpus, 2);
        assert_eq!(opts.memory_mib, 2048);
        assert_eq!(opts.disk_size_mib, 20480);
        assert_eq!(opts.workdir, PathBuf::from("."));
        assert!(opts.sanitize().is_ok());
    }

    #[test]
    fn test_short_flags() {
        let cli =
            TestCli::try_parse_from(["guestboot", "-s", "-c", "console=hvc0 root=/dev/vda"])
                .unwrap();
        assert!(cli.options.setup);
        assert_eq!(cli.options.command_line, "console=hvc0 root=/dev/vda");
    }

    #[test]
    fn test_sanitize_rejects_unbootable_values() {
        let zero_cpus = BootOptions {
            cpus: 0,
            ..Default::default()
        };
        assert!(zero_cpus.sanitize().is_err());

        let tiny_memory = BootOptions {
            memory_mib: 64,
            ..Default::default()
        };
        assert!(tiny_memory.sanitize().is_err());

        let blank_cmdline = BootOptions {
            command_line: "  ".into(),
            ..Default::default()
        };
        assert!(blank_cmdline.sanitize().is_err());

        let no_disk = BootOptions {
            disk_size_mib: 0,
            ..Default::default()
        };
        assert!(matches!(no_disk.sanitize(), Err(BootError::Config(_))));
    }
}
