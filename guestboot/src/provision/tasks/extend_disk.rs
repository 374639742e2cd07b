//! Task: grow the root disk image to the configured size.

use super::{ProvisionCtx, checkpoint, log_task_error, task_start};
use crate::errors::BootResult;
use crate::pipeline::PipelineTask;
use crate::provision::extend::extend_disk;
use async_trait::async_trait;

pub struct ExtendDiskTask;

#[async_trait]
impl PipelineTask<ProvisionCtx> for ExtendDiskTask {
    async fn run(self: Box<Self>, ctx: ProvisionCtx) -> BootResult<()> {
        let task_name = self.name();
        task_start(task_name);
        checkpoint(&ctx)?;

        extend_disk(&ctx.layout.disk_path(), ctx.disk_size_mib)
            .await
            .inspect_err(|e| log_task_error(task_name, e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "extend_disk"
    }
}
