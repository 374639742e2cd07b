//! Task: fetch one boot asset and bring it into its final form.

use super::{ProvisionCtx, blocking, checkpoint, log_task_error, task_start};
use crate::errors::{BootError, BootResult};
use crate::pipeline::PipelineTask;
use crate::provision::fetch::download_to_file;
use crate::provision::transform::{extract_member, flatten, gunzip};
use crate::provision::types::{BootAssetSpec, Transform};
use async_trait::async_trait;
use std::path::Path;

pub struct AssetTask {
    spec: BootAssetSpec,
}

impl AssetTask {
    pub fn new(spec: BootAssetSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl PipelineTask<ProvisionCtx> for AssetTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootResult<()> {
        let task_name = self.spec.name;
        task_start(task_name);

        materialize(&self.spec, &ctx)
            .await
            .inspect_err(|e| log_task_error(task_name, e))?;

        tracing::info!(
            task = task_name,
            path = %self.spec.destination.display(),
            "Boot asset ready"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        self.spec.name
    }
}

async fn materialize(spec: &BootAssetSpec, ctx: &ProvisionCtx) -> BootResult<()> {
    checkpoint(ctx)?;
    let download = spec.download_path();
    download_to_file(
        ctx.fetcher.as_ref(),
        spec.name,
        &spec.source_url,
        &download,
        &ctx.cancel,
    )
    .await?;
    checkpoint(ctx)?;

    match spec.transform {
        Transform::None => Ok(()),
        Transform::GunzipDecompress => {
            let (name, src, dest) = (spec.name, download.clone(), spec.destination.clone());
            blocking(name, move || gunzip(name, &src, &dest).map(|_| ())).await?;
            remove_download(spec.name, &download).await
        }
        Transform::TarGzExtractAndFlatten => {
            let member = spec
                .destination_name()
                .ok_or_else(|| {
                    BootError::transform(spec.name, "destination has no usable file name")
                })?
                .to_string();

            // A flat image from an earlier setup would block the extraction directory.
            if spec.destination.is_file() {
                tokio::fs::remove_file(&spec.destination)
                    .await
                    .map_err(|e| BootError::transform(spec.name, e))?;
            }

            let (name, archive, dest) = (spec.name, download.clone(), spec.destination.clone());
            blocking(name, move || {
                extract_member(name, &archive, &member, &dest).map(|_| ())
            })
            .await?;
            remove_download(spec.name, &download).await?;
            checkpoint(ctx)?;

            let (name, target) = (spec.name, spec.destination.clone());
            blocking(name, move || flatten(name, &target)).await
        }
    }
}

async fn remove_download(asset: &str, path: &Path) -> BootResult<()> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|e| BootError::transform(asset, format!("remove {}: {}", path.display(), e)))
}
