//! Executor for stage tables.

use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::{ExecutionMode, Stage};
use super::task::BoxedTask;
use crate::errors::{BootError, BootResult};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }

    pub fn stages(self) -> Vec<Stage<BoxedTask<Ctx>>> {
        self.stages
    }
}

pub struct Pipeline<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> Pipeline<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }
}

pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn from_plan<Ctx>(plan: ExecutionPlan<Ctx>) -> Pipeline<Ctx> {
        Pipeline::new(plan.stages())
    }
}

/// Runs a [`Pipeline`] to completion or first failure.
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run every stage in order.
    ///
    /// `cancel` is checked before each stage and before each sequential
    /// task. The executor cancels it itself when a task fails.
    pub async fn execute<Ctx>(
        pipeline: Pipeline<Ctx>,
        ctx: Ctx,
        cancel: CancellationToken,
    ) -> BootResult<PipelineMetrics>
    where
        Ctx: Clone + Send + Sync + 'static,
    {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::new();

        for (index, stage) in pipeline.stages.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(BootError::Cancelled);
            }

            let execution = stage.execution;
            let stage_start = Instant::now();
            tracing::debug!(stage = stage.name, mode = ?execution, tasks = stage.tasks.len(), "Stage started");

            let task_metrics = match execution {
                ExecutionMode::Parallel => run_parallel(stage.tasks, &ctx, &cancel).await?,
                ExecutionMode::Sequential => run_sequential(stage.tasks, &ctx, &cancel).await?,
            };

            stage_metrics.push(StageMetrics {
                index,
                name: stage.name,
                execution,
                duration_ms: stage_start.elapsed().as_millis(),
                tasks: task_metrics,
            });
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        })
    }
}

/// Run all tasks concurrently and wait for every one of them.
async fn run_parallel<Ctx: Clone>(
    tasks: Vec<BoxedTask<Ctx>>,
    ctx: &Ctx,
    cancel: &CancellationToken,
) -> BootResult<Vec<TaskMetrics>> {
    let mut running: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|task| {
            let ctx = ctx.clone();
            async move {
                let name = task.name().to_string();
                let task_start = Instant::now();
                let result = task.run(ctx).await;
                (name, task_start.elapsed().as_millis(), result)
            }
        })
        .collect();

    let mut first_error: Option<BootError> = None;
    let mut task_metrics = Vec::new();

    while let Some((name, duration_ms, result)) = running.next().await {
        match result {
            Ok(()) => task_metrics.push(TaskMetrics { name, duration_ms }),
            Err(e) if first_error.is_none() => {
                tracing::warn!(task = %name, error = %e, "Task failed, cancelling siblings");
                cancel.cancel();
                first_error = Some(e.in_step(name));
            }
            Err(e) => {
                tracing::debug!(task = %name, error = %e, "Sibling task stopped");
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(task_metrics),
    }
}

async fn run_sequential<Ctx: Clone>(
    tasks: Vec<BoxedTask<Ctx>>,
    ctx: &Ctx,
    cancel: &CancellationToken,
) -> BootResult<Vec<TaskMetrics>> {
    let mut task_metrics = Vec::new();
    for task in tasks {
        if cancel.is_cancelled() {
            return Err(BootError::Cancelled);
        }
        let name = task.name().to_string();
        let task_start = Instant::now();
        if let Err(e) = task.run(ctx.clone()).await {
            cancel.cancel();
            return Err(e.in_step(name));
        }
        task_metrics.push(TaskMetrics {
            name,
            duration_ms: task_start.elapsed().as_millis(),
        });
    }
    Ok(task_metrics)
}
