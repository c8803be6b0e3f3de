use crate::task::multi::MultiTask;
use crate::task::types::*;
use crate::task::unit::Task;
use std::sync::Arc;

/// Either a single unit or an aggregate, behind one set of operations
#[derive(Debug, Clone)]
pub enum TaskExecutor {
    Single(Arc<Task>),
    Multi(Arc<MultiTask>),
}

impl TaskExecutor {
    pub fn id(&self) -> TaskId {
        match self {
            TaskExecutor::Single(task) => task.id(),
            TaskExecutor::Multi(multi) => multi.id(),
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            TaskExecutor::Single(task) => task.state(),
            TaskExecutor::Multi(multi) => multi.state(),
        }
    }

    pub fn start(&self) {
        match self {
            TaskExecutor::Single(task) => task.start(),
            TaskExecutor::Multi(multi) => multi.start(),
        }
    }

    pub fn cancel(&self) {
        match self {
            TaskExecutor::Single(task) => task.cancel(),
            TaskExecutor::Multi(multi) => multi.cancel(),
        }
    }

    /// Register the completion handler; an aggregate calls it once, at the join
    pub fn on_complete(&self, handler: ResultHandler) {
        match self {
            TaskExecutor::Single(task) => task.on_complete(handler),
            TaskExecutor::Multi(multi) => multi.on_complete(handler),
        }
    }

    /// Register the error handler; an aggregate calls it per failed unit
    pub fn on_error(&self, handler: ResultHandler) {
        match self {
            TaskExecutor::Single(task) => task.on_error(handler),
            TaskExecutor::Multi(multi) => multi.on_error(handler),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, TaskExecutor::Multi(_))
    }
}
