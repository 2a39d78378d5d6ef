//! Stage definition.

/// How the tasks of one stage are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// All tasks are polled concurrently; the first error aborts the stage.
    Parallel,
    /// Tasks run in declaration order.
    Sequential,
}

/// A group of tasks sharing one execution mode.
///
/// Stages always run in order; a stage starts only after the previous one
/// finished successfully.
#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub tasks: Vec<T>,
    pub execution: ExecutionMode,
}

impl<T> Stage<T> {
    pub fn parallel(tasks: Vec<T>) -> Self {
        Self {
            tasks,
            execution: ExecutionMode::Parallel,
        }
    }

    pub fn sequential(tasks: Vec<T>) -> Self {
        Self {
            tasks,
            execution: ExecutionMode::Sequential,
        }
    }
}
