//! Boot asset provisioning.
//!
//! ```text
//! Stage 1 (parallel):    kernel ─┬─ fetch + gunzip       → vmlinuz
//!                        initrd ─┼─ fetch                → initrd
//!                    disk_image ─┴─ fetch + untar + flatten → <image>.img
//! Stage 2 (sequential):  extend_disk (dd seek to target size)
//! ```
//!
//! The first failing task cancels the shared token; the others stop at their
//! next checkpoint and the pipeline reports the first error, wrapped with the
//! failing task's name. Nothing is cleaned up on failure.

mod extend;
mod fetch;
mod tasks;
mod transform;
mod types;

pub use extend::{ExtendOutcome, dd_args, extend_disk};
pub use fetch::{AssetFetcher, ByteStream, HttpFetcher, download_to_file};
pub use tasks::ProvisionCtx;
pub use transform::{extract_member, flatten, gunzip};
pub use types::{BootAssetSpec, Transform};

#[cfg(test)]
pub(crate) use fetch::testing;

use crate::constants::urls;
use crate::errors::BootResult;
use crate::layout::AssetLayout;
use crate::pipeline::{
    BoxedTask, ExecutionPlan, PipelineBuilder, PipelineExecutor, PipelineMetrics, Stage,
};
use std::sync::Arc;
use tasks::{AssetTask, ExtendDiskTask};
use tokio_util::sync::CancellationToken;

/// Everything provisioning needs.
pub struct ProvisionContext {
    pub layout: AssetLayout,
    pub fetcher: Arc<dyn AssetFetcher>,
    /// Shared by all tasks; cancelled by the first failure or by the caller.
    pub cancel: CancellationToken,
    pub disk_size_mib: u64,
}

/// The three boot assets, resolved against `layout`.
pub fn boot_asset_specs(layout: &AssetLayout) -> Vec<BootAssetSpec> {
    vec![
        BootAssetSpec::new(
            "kernel",
            urls::KERNEL,
            layout.kernel_path(),
            Transform::GunzipDecompress,
        ),
        BootAssetSpec::new("initrd", urls::INITRD, layout.initrd_path(), Transform::None),
        BootAssetSpec::new(
            "disk_image",
            urls::DISK_IMAGE,
            layout.disk_path(),
            Transform::TarGzExtractAndFlatten,
        ),
    ]
}

fn execution_plan(specs: Vec<BootAssetSpec>) -> ExecutionPlan<ProvisionCtx> {
    let fetch_tasks: Vec<BoxedTask<ProvisionCtx>> = specs
        .into_iter()
        .map(|spec| Box::new(AssetTask::new(spec)) as BoxedTask<ProvisionCtx>)
        .collect();

    ExecutionPlan::new(vec![
        // Phase 1: independent downloads and transforms
        Stage::parallel("fetch_assets", fetch_tasks),
        // Phase 2: needs the flattened image
        Stage::sequential("extend_disk", vec![Box::new(ExtendDiskTask)]),
    ])
}

/// Fetch and prepare all boot assets, then extend the disk image.
pub async fn provision(ctx: ProvisionContext) -> BootResult<PipelineMetrics> {
    ctx.layout.prepare()?;

    let cancel = ctx.cancel.clone();
    let plan = execution_plan(boot_asset_specs(&ctx.layout));
    let pipeline = PipelineBuilder::from_plan(plan);

    let metrics = PipelineExecutor::execute(pipeline, Arc::new(ctx), cancel).await?;
    metrics.log_tasks();
    Ok(metrics)
}
