//! Units of work scheduled by the executor.

use crate::errors::BootResult;
use async_trait::async_trait;

/// One unit of provisioning work.
///
/// The executor hands each task its own clone of the run context and
/// consumes the task. Long-running tasks poll the run's cancellation token
/// between steps and return [`BootError::Cancelled`] once it fires.
///
/// [`BootError::Cancelled`]: crate::errors::BootError::Cancelled
#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> BootResult<()>;

    /// Label used in logs, metrics and step-wrapped errors.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;
