//! Table-driven task pipeline.
//!
//! ```text
//! ExecutionPlan ─► Pipeline ─► Stage "fetch" (parallel)    ─► Task, Task, Task
//!                           └► Stage "extend" (sequential) ─► Task
//! ```
//!
//! Every task of a run receives a clone of the same context and shares one
//! [`CancellationToken`]. The first failing task cancels that token; a
//! parallel stage still waits for all of its tasks to return, so nothing
//! outlives [`PipelineExecutor::execute`]. The error reported is the first
//! one observed, wrapped with the name of the task that raised it.
//!
//! ```ignore
//! let plan = ExecutionPlan::new(vec![
//!     Stage::parallel("fetch", vec![Box::new(KernelTask), Box::new(InitrdTask)]),
//!     Stage::sequential("extend", vec![Box::new(ExtendTask)]),
//! ]);
//! let metrics = PipelineExecutor::execute(PipelineBuilder::from_plan(plan), ctx, cancel).await?;
//! metrics.log_tasks();
//! ```
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;
mod task;

pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use pipeline::{ExecutionPlan, Pipeline, PipelineBuilder, PipelineExecutor};
pub use stage::{ExecutionMode, Stage};
pub use task::{BoxedTask, PipelineTask};
