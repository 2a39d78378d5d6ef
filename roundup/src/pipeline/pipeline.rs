//! Pipeline executor.

use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::{ExecutionMode, Stage};
use super::task::BoxedTask;
use futures::future::try_join_all;
use roundup_shared::{RoundupError, RoundupResult};
use std::time::Instant;

/// Ordered stages to execute.
pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn into_stages(self) -> Vec<Stage<BoxedTask<Ctx>>> {
        self.stages
    }
}

pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run every stage of `plan` against `ctx`.
    ///
    /// Stops at the first failing task; later stages are never started.
    pub async fn execute<Ctx>(
        pipeline: &str,
        plan: ExecutionPlan<Ctx>,
        ctx: Ctx,
    ) -> RoundupResult<PipelineMetrics>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::with_capacity(plan.stage_count());

        for (index, stage) in plan.into_stages().into_iter().enumerate() {
            let execution = stage.execution;
            let stage_start = Instant::now();

            let tasks = match execution {
                ExecutionMode::Parallel => {
                    let futures = stage.tasks.into_iter().map(|task| {
                        let ctx = ctx.clone();
                        async move { run_task(pipeline, index, task, ctx).await }
                    });
                    try_join_all(futures).await?
                }
                ExecutionMode::Sequential => {
                    let mut tasks = Vec::with_capacity(stage.tasks.len());
                    for task in stage.tasks {
                        tasks.push(run_task(pipeline, index, task, ctx.clone()).await?);
                    }
                    tasks
                }
            };

            stage_metrics.push(StageMetrics {
                index,
                execution,
                duration_us: stage_start.elapsed().as_micros(),
                tasks,
            });
        }

        Ok(PipelineMetrics {
            pipeline: pipeline.to_string(),
            total_duration_us: total_start.elapsed().as_micros(),
            stages: stage_metrics,
        })
    }
}

async fn run_task<Ctx>(
    pipeline: &str,
    stage: usize,
    task: BoxedTask<Ctx>,
    ctx: Ctx,
) -> RoundupResult<TaskMetrics> {
    let name = task.name().to_string();
    let start = Instant::now();
    task.run(ctx).await.inspect_err(|e: &RoundupError| {
        tracing::warn!(pipeline, stage, task = %name, error = %e, "pipeline task failed");
    })?;
    Ok(TaskMetrics {
        name,
        duration_us: start.elapsed().as_micros(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineTask, Stage};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type TestCtx = Arc<Mutex<Vec<String>>>;

    struct Record(&'static str);

    #[async_trait]
    impl PipelineTask<TestCtx> for Record {
        async fn run(self: Box<Self>, ctx: TestCtx) -> RoundupResult<()> {
            ctx.lock().await.push(self.0.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    struct Fail;

    #[async_trait]
    impl PipelineTask<TestCtx> for Fail {
        async fn run(self: Box<Self>, _ctx: TestCtx) -> RoundupResult<()> {
            Err(RoundupError::Internal("boom".into()))
        }

        fn name(&self) -> &str {
            "fail"
        }
    }

    #[tokio::test]
    async fn test_sequential_stages_run_in_order() {
        let ctx: TestCtx = Arc::new(Mutex::new(Vec::new()));
        let plan = ExecutionPlan::new(vec![
            Stage::sequential(vec![
                Box::new(Record("a")) as BoxedTask<TestCtx>,
                Box::new(Record("b")),
            ]),
            Stage::sequential(vec![Box::new(Record("c")) as BoxedTask<TestCtx>]),
        ]);

        let metrics = PipelineExecutor::execute("test", plan, Arc::clone(&ctx))
            .await
            .unwrap();

        assert_eq!(*ctx.lock().await, vec!["a", "b", "c"]);
        assert_eq!(metrics.stages.len(), 2);
        assert_eq!(metrics.task_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_parallel_stage_runs_all_tasks() {
        let ctx: TestCtx = Arc::new(Mutex::new(Vec::new()));
        let plan = ExecutionPlan::new(vec![Stage::parallel(vec![
            Box::new(Record("x")) as BoxedTask<TestCtx>,
            Box::new(Record("y")),
        ])]);

        let metrics = PipelineExecutor::execute("test", plan, Arc::clone(&ctx))
            .await
            .unwrap();

        let mut seen = ctx.lock().await.clone();
        seen.sort();
        assert_eq!(seen, vec!["x", "y"]);
        assert_eq!(metrics.stages[0].execution, ExecutionMode::Parallel);
    }

    #[tokio::test]
    async fn test_failure_stops_later_stages() {
        let ctx: TestCtx = Arc::new(Mutex::new(Vec::new()));
        let plan = ExecutionPlan::new(vec![
            Stage::sequential(vec![Box::new(Fail) as BoxedTask<TestCtx>]),
            Stage::sequential(vec![Box::new(Record("never")) as BoxedTask<TestCtx>]),
        ]);

        let result = PipelineExecutor::execute("test", plan, Arc::clone(&ctx)).await;

        assert!(matches!(result, Err(RoundupError::Internal(_))));
        assert!(ctx.lock().await.is_empty());
    }
}
