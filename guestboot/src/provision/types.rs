//! Boot asset descriptors.

use std::path::PathBuf;

/// How a downloaded asset becomes its final on-disk form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// The download is the asset.
    None,
    /// The download is a gzip stream of the asset.
    GunzipDecompress,
    /// The download is a tar.gz bundle containing the asset as a member of
    /// the same name. Extraction yields `<dest>/<name>`, which is then
    /// flattened to `<dest>`.
    TarGzExtractAndFlatten,
}

/// One remote boot asset and where it lands.
#[derive(Debug, Clone)]
pub struct BootAssetSpec {
    /// Short name used for task naming and logging.
    pub name: &'static str,
    pub source_url: String,
    pub destination: PathBuf,
    pub transform: Transform,
}

impl BootAssetSpec {
    pub fn new(
        name: &'static str,
        source_url: impl Into<String>,
        destination: impl Into<PathBuf>,
        transform: Transform,
    ) -> Self {
        Self {
            name,
            source_url: source_url.into(),
            destination: destination.into(),
            transform,
        }
    }

    /// Where the raw download is written.
    ///
    /// Untransformed assets download straight to their destination. The
    /// others use the URL's last path segment next to the destination.
    pub fn download_path(&self) -> PathBuf {
        if self.transform == Transform::None {
            return self.destination.clone();
        }
        let basename = self
            .source_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.download", self.name));
        match self.destination.parent() {
            Some(parent) => parent.join(basename),
            None => PathBuf::from(basename),
        }
    }

    /// File name of the destination, used as the archive member to extract.
    pub fn destination_name(&self) -> Option<&str> {
        self.destination.file_name().and_then(|n| n.to_str())
    }
}
