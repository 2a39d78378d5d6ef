use crate::pipeline::ExecutionMode;

#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub name: String,
    pub duration_us: u128,
}

#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub index: usize,
    pub execution: ExecutionMode,
    pub duration_us: u128,
    pub tasks: Vec<TaskMetrics>,
}

/// Timings of one pipeline run, in microseconds.
///
/// Request pipelines finish in well under a millisecond for small inputs,
/// so milliseconds would mostly read zero.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub pipeline: String,
    pub total_duration_us: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn task_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .map(|task| task.name.as_str())
            .collect()
    }

    /// Emit one debug event per task.
    pub fn log_tasks(&self) {
        for stage in &self.stages {
            for task in &stage.tasks {
                tracing::debug!(
                    pipeline = %self.pipeline,
                    stage = stage.index,
                    execution = ?stage.execution,
                    task = %task.name,
                    duration_us = task.duration_us as u64,
                    "pipeline task finished"
                );
            }
        }
        tracing::debug!(
            pipeline = %self.pipeline,
            total_duration_us = self.total_duration_us as u64,
            "pipeline finished"
        );
    }
}
