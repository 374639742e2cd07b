//! Growing the raw disk image with `dd`.

use crate::constants::MIB;
use crate::errors::{BootError, BootResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Result of an extension request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    /// The image grew from `from` to `to` bytes.
    Extended { from: u64, to: u64 },
    /// The image was already at or above the target; nothing ran.
    Unchanged { current: u64 },
}

/// Arguments for `dd` that seek to `size_mib` MiB and write nothing,
/// leaving a sparse tail.
pub fn dd_args(path: &Path, size_mib: u64) -> Vec<String> {
    vec![
        "if=/dev/zero".to_string(),
        format!("of={}", path.display()),
        format!("seek={}", size_mib),
        "bs=1024k".to_string(),
        "count=0".to_string(),
    ]
}

/// Grow the image at `path` to `target_mib` MiB.
///
/// Never shrinks: a target at or below the current size is a logged no-op.
pub async fn extend_disk(path: &Path, target_mib: u64) -> BootResult<ExtendOutcome> {
    let current = tokio::fs::metadata(path)
        .await
        .map_err(|e| BootError::Extension(format!("stat {}: {}", path.display(), e)))?
        .len();
    let target = target_mib
        .checked_mul(MIB)
        .ok_or_else(|| BootError::Extension(format!("target size {} MiB overflows", target_mib)))?;

    if target <= current {
        tracing::info!(
            path = %path.display(),
            current_bytes = current,
            target_bytes = target,
            "Disk image already at or above target size, not extending"
        );
        return Ok(ExtendOutcome::Unchanged { current });
    }

    let output = Command::new("dd")
        .args(dd_args(path, target_mib))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| BootError::Extension(format!("failed to run dd: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BootError::Extension(format!(
            "dd exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    tracing::info!(
        path = %path.display(),
        from_bytes = current,
        to_bytes = target,
        "Disk image extended"
    );
    Ok(ExtendOutcome::Extended {
        from: current,
        to: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dd_args() {
        let args = dd_args(Path::new("/work/disk.img"), 20480);
        assert_eq!(
            args,
            vec![
                "if=/dev/zero",
                "of=/work/disk.img",
                "seek=20480",
                "bs=1024k",
                "count=0"
            ]
        );
    }

    #[tokio::test]
    async fn test_smaller_target_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disk.img");
        std::fs::write(&disk, vec![0u8; 2 * MIB as usize]).unwrap();

        let outcome = extend_disk(&disk, 1).await.unwrap();
        assert_eq!(outcome, ExtendOutcome::Unchanged { current: 2 * MIB });

        let outcome = extend_disk(&disk, 2).await.unwrap();
        assert_eq!(outcome, ExtendOutcome::Unchanged { current: 2 * MIB });
        assert_eq!(std::fs::metadata(&disk).unwrap().len(), 2 * MIB);
    }

    #[tokio::test]
    async fn test_missing_image_is_extension_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extend_disk(&dir.path().join("absent.img"), 1).await.unwrap_err();
        assert!(matches!(err, BootError::Extension(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_grows_sparse_tail() {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disk.img");
        std::fs::write(&disk, b"bootsector").unwrap();

        let outcome = extend_disk(&disk, 3).await.unwrap();
        assert_eq!(
            outcome,
            ExtendOutcome::Extended {
                from: 10,
                to: 3 * MIB
            }
        );
        assert_eq!(std::fs::metadata(&disk).unwrap().len(), 3 * MIB);
        let head = std::fs::read(&disk).unwrap();
        assert_eq!(&head[..10], b"bootsector");
    }
}
