//! Staged task pipeline.
//!
//! A pipeline is an ordered list of stages; each stage owns a set of tasks
//! that run either one after another or concurrently. Every task receives a
//! clone of the shared context, so the context is normally an
//! `Arc<tokio::sync::Mutex<_>>` that tasks lock briefly to read inputs and
//! publish outputs.
//!
//! ```text
//! Pipeline → Stage (sequential | parallel) → Task
//! ```
//!
//! Two pipelines are built on it: the `/calculate` orchestrator
//! (parse → validate → filter → {nps, index}) and the image build
//! (resolve → install → assemble).
//!
//! ```ignore
//! let plan = ExecutionPlan::new(vec![
//!     Stage::sequential(vec![Box::new(ParseTask)]),
//!     Stage::parallel(vec![Box::new(NpsTask), Box::new(IndexTask)]),
//! ]);
//! let metrics = PipelineExecutor::execute("calculate", plan, ctx).await?;
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;
mod task;

pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use pipeline::{ExecutionPlan, PipelineExecutor};
pub use stage::{ExecutionMode, Stage};
pub use task::{BoxedTask, PipelineTask};
