//! Stages: named groups of tasks sharing an execution mode.

/// How the tasks of one stage are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// All tasks at once; the stage ends when every task has returned.
    Parallel,
    /// One task at a time, in table order.
    Sequential,
}

/// A named step of an execution plan.
///
/// Stages run in order. A stage only starts once the previous one
/// succeeded.
#[derive(Debug, Clone)]
pub struct Stage<T> {
    pub name: &'static str,
    pub tasks: Vec<T>,
    pub execution: ExecutionMode,
}

impl<T> Stage<T> {
    pub fn parallel(name: &'static str, tasks: Vec<T>) -> Self {
        Self {
            name,
            tasks,
            execution: ExecutionMode::Parallel,
        }
    }

    pub fn sequential(name: &'static str, tasks: Vec<T>) -> Self {
        Self {
            name,
            tasks,
            execution: ExecutionMode::Sequential,
        }
    }
}
