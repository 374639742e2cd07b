//! Blocking file transforms applied after download.
//!
//! Callers run these on the blocking pool.

use crate::errors::{BootError, BootResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::Archive;

/// Decompress the gzip file `src` into `dest`. Returns bytes written.
pub fn gunzip(asset: &str, src: &Path, dest: &Path) -> BootResult<u64> {
    let input = File::open(src)
        .map_err(|e| BootError::transform(asset, format!("open {}: {}", src.display(), e)))?;
    let output = File::create(dest)
        .map_err(|e| BootError::transform(asset, format!("create {}: {}", dest.display(), e)))?;

    let mut decoder = GzDecoder::new(input);
    let mut writer = BufWriter::new(output);
    let written = io::copy(&mut decoder, &mut writer)
        .map_err(|e| BootError::transform(asset, format!("decompress {}: {}", src.display(), e)))?;
    writer
        .flush()
        .map_err(|e| BootError::transform(asset, format!("flush {}: {}", dest.display(), e)))?;

    Ok(written)
}

/// Extract the single member called `member` from the tar.gz `archive`
/// into `dest_dir/member`, creating `dest_dir`.
///
/// Members are matched on their final path component, so `./disk.img` and
/// `disk.img` both match `disk.img`.
pub fn extract_member(
    asset: &str,
    archive: &Path,
    member: &str,
    dest_dir: &Path,
) -> BootResult<PathBuf> {
    let file = File::open(archive)
        .map_err(|e| BootError::transform(asset, format!("open {}: {}", archive.display(), e)))?;
    let mut archive_reader = Archive::new(GzDecoder::new(file));

    fs::create_dir_all(dest_dir).map_err(|e| {
        BootError::transform(asset, format!("create {}: {}", dest_dir.display(), e))
    })?;

    let entries = archive_reader
        .entries()
        .map_err(|e| BootError::transform(asset, format!("read archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| BootError::transform(asset, format!("read archive entry: {}", e)))?;
        let matches = entry
            .path()
            .map(|p| p.file_name().is_some_and(|n| n == member))
            .unwrap_or(false);
        if !matches || !entry.header().entry_type().is_file() {
            continue;
        }

        let target = dest_dir.join(member);
        entry.unpack(&target).map_err(|e| {
            BootError::transform(asset, format!("unpack {}: {}", target.display(), e))
        })?;
        return Ok(target);
    }

    Err(BootError::transform(
        asset,
        format!("member {} not found in {}", member, archive.display()),
    ))
}

fn staging_dir(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".flatten");
    target.with_file_name(name)
}

/// Collapse `target/<name>` into `target`, where `<name>` is the file name
/// of `target` itself.
///
/// The directory is renamed to a staging name, the inner file is moved up
/// to `target`, and the staging directory is removed. A `target` that is
/// already a regular file is left alone. When `target` is missing, a staging
/// directory left behind by an interrupted run is finished off; when
/// `target` is a fresh extraction, a leftover staging directory is stale and
/// is discarded first.
pub fn flatten(asset: &str, target: &Path) -> BootResult<()> {
    let name = target
        .file_name()
        .ok_or_else(|| BootError::transform(asset, format!("no file name in {}", target.display())))?;
    let staging = staging_dir(target);

    if target.is_file() {
        if staging.is_dir() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!(
                    asset,
                    path = %staging.display(),
                    error = %e,
                    "Failed to remove leftover staging directory"
                );
            }
        }
        tracing::debug!(asset, path = %target.display(), "Already flat");
        return Ok(());
    }

    if target.is_dir() {
        if staging.exists() {
            tracing::info!(asset, path = %staging.display(), "Discarding stale staging directory");
            fs::remove_dir_all(&staging).map_err(|e| {
                BootError::transform(asset, format!("remove {}: {}", staging.display(), e))
            })?;
        }
        fs::rename(target, &staging).map_err(|e| {
            BootError::transform(asset, format!("rename {}: {}", target.display(), e))
        })?;
    } else if !staging.is_dir() {
        return Err(BootError::transform(
            asset,
            format!("nothing to flatten at {}", target.display()),
        ));
    }

    let inner = staging.join(name);
    fs::rename(&inner, target).map_err(|e| {
        BootError::transform(asset, format!("move {} up: {}", inner.display(), e))
    })?;
    fs::remove_dir(&staging).map_err(|e| {
        BootError::transform(asset, format!("remove {}: {}", staging.display(), e))
    })?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::{gzip, tar_gz};
    use super::*;

    #[test]
    fn test_gunzip_restores_content() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vmlinuz-generic");
        let dest = dir.path().join("vmlinuz");
        fs::write(&src, gzip(b"kernel image bytes")).unwrap();

        let n = gunzip("kernel", &src, &dest).unwrap();
        assert_eq!(n, 18);
        assert_eq!(fs::read(&dest).unwrap(), b"kernel image bytes");
    }

    #[test]
    fn test_gunzip_rejects_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vmlinuz-generic");
        fs::write(&src, b"not gzip at all").unwrap();

        let err = gunzip("kernel", &src, &dir.path().join("vmlinuz")).unwrap_err();
        assert!(matches!(err, BootError::Transform { .. }));
    }

    #[test]
    fn test_extract_member_picks_named_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.tar.gz");
        fs::write(
            &archive,
            tar_gz(&[("README", &b"notes"[..]), ("./disk.img", &b"raw disk"[..])]),
        )
        .unwrap();

        let dest_dir = dir.path().join("disk.img");
        let extracted = extract_member("disk_image", &archive, "disk.img", &dest_dir).unwrap();

        assert_eq!(extracted, dest_dir.join("disk.img"));
        assert_eq!(fs::read(&extracted).unwrap(), b"raw disk");
        assert!(!dest_dir.join("README").exists());
    }

    #[test]
    fn test_extract_missing_member_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.tar.gz");
        fs::write(&archive, tar_gz(&[("other.img", &b"x"[..])])).unwrap();

        let err = extract_member("disk_image", &archive, "disk.img", &dir.path().join("disk.img"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("disk.img");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("disk.img"), b"raw disk").unwrap();

        flatten("disk_image", &target).unwrap();
        assert!(target.is_file());
        assert_eq!(fs::read(&target).unwrap(), b"raw disk");

        flatten("disk_image", &target).unwrap();
        assert!(target.is_file());
        assert_eq!(fs::read(&target).unwrap(), b"raw disk");
        assert!(!staging_dir(&target).exists());
    }

    #[test]
    fn test_flatten_finishes_interrupted_run() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("disk.img");
        let staging = staging_dir(&target);
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("disk.img"), b"raw disk").unwrap();

        flatten("disk_image", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"raw disk");
        assert!(!staging.exists());
    }

    #[test]
    fn test_flatten_discards_stale_staging_for_fresh_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("disk.img");
        let staging = staging_dir(&target);
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("disk.img"), b"old disk").unwrap();
        fs::create_dir(&target).unwrap();
        fs::write(target.join("disk.img"), b"new disk").unwrap();

        flatten("disk_image", &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new disk");
        assert!(!staging.exists());
    }

    #[test]
    fn test_flatten_without_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = flatten("disk_image", &dir.path().join("disk.img")).unwrap_err();
        assert!(matches!(err, BootError::Transform { .. }));
    }
}
