//! HTTP fetch capability and streaming download to disk.

use crate::errors::{BootError, BootResult};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Chunks of a response body.
pub type ByteStream = BoxStream<'static, BootResult<Vec<u8>>>;

/// Source of remote bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Open `url` and return its body as a chunk stream.
    async fn fetch(&self, url: &str) -> BootResult<ByteStream>;
}

/// [`AssetFetcher`] backed by a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> BootResult<Self> {
        // No overall timeout: the disk bundle is several hundred MiB.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("guestboot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BootError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> BootResult<ByteStream> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BootError::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(BootError::fetch(
                url,
                format!("server returned {}", response.status()),
            ));
        }

        let url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| BootError::fetch(url.clone(), e))
            })
            .boxed();
        Ok(stream)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Stream `url` into `dest`, checking `cancel` before the request and
/// between chunks.
///
/// Bytes go to `<dest>.tmp` first and are renamed into place once the body
/// is complete, so `dest` only ever holds a full download.
pub async fn download_to_file(
    fetcher: &dyn AssetFetcher,
    asset: &str,
    url: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> BootResult<u64> {
    tracing::info!(asset, url, "Downloading");

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(BootError::Cancelled),
        stream = fetcher.fetch(url) => stream?,
    };

    let temp_path = partial_path(dest);
    let mut file = tokio::fs::File::create(&temp_path).await.map_err(|e| {
        BootError::fetch(asset, format!("create {}: {}", temp_path.display(), e))
    })?;

    let mut downloaded: u64 = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BootError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;

        file.write_all(&chunk)
            .await
            .map_err(|e| BootError::fetch(asset, format!("write error: {}", e)))?;
        downloaded += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| BootError::fetch(asset, format!("flush error: {}", e)))?;
    drop(file);

    tokio::fs::rename(&temp_path, dest)
        .await
        .map_err(|e| BootError::fetch(asset, format!("rename error: {}", e)))?;

    tracing::debug!(asset, bytes = downloaded, dest = %dest.display(), "Download complete");
    Ok(downloaded)
}


#[cfg(test)]
mod tests {
    use super::testing::{Served, StaticFetcher};
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_download_joins_chunks_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("initrd");
        let fetcher = StaticFetcher::default().serve(
            "https://example.com/initrd",
            Served::Chunks(vec![b"hello ".to_vec(), b"guest".to_vec()]),
        );

        let n = download_to_file(
            &fetcher,
            "initrd",
            "https://example.com/initrd",
            &dest,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(n, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello guest");
        assert!(!dir.path().join("initrd.tmp").exists());
    }

    #[tokio::test]
    async fn test_stalled_download_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("vmlinuz");
        let fetcher = StaticFetcher::default().serve("https://example.com/k", Served::Stall);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = download_to_file(&fetcher, "kernel", "https://example.com/k", &dest, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_route_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = download_to_file(
            &StaticFetcher::default(),
            "initrd",
            "https://example.com/none",
            &dir.path().join("initrd"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BootError::Fetch { .. }));
    }
}
