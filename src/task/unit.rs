//! Single unit of work.
//!
//! A [`Task`] wraps one callable. `start` submits it to a dispatcher; the
//! callable reports its outcome through the [`TaskHandle`] it receives.
//! Each task makes exactly one terminal transition, after which its
//! completion or error handler runs, then its end-of-lifecycle hook.

use crate::dispatch::Dispatcher;
use crate::task::types::*;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Clone, Default)]
struct Handlers {
    complete: Option<ResultHandler>,
    error: Option<ResultHandler>,
}

/// Unit executor
pub struct Task {
    id: TaskId,
    // Guards the state field only; never held while handlers run.
    state: Mutex<TaskState>,
    action: Mutex<Option<TaskAction>>,
    handlers: Mutex<Handlers>,
    on_end: EndHook,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Task {
    /// Create an idle task.
    ///
    /// `on_end` fires once, after any handler, when the task reaches a
    /// terminal state.
    pub fn new(action: TaskAction, dispatcher: Arc<dyn Dispatcher>, on_end: EndHook) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: Mutex::new(TaskState::Idle),
            action: Mutex::new(Some(action)),
            handlers: Mutex::new(Handlers::default()),
            on_end,
            dispatcher,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Snapshot of the current state
    pub fn state(&self) -> TaskState {
        self.state.lock().clone()
    }

    /// Register the handler invoked with a successful result
    pub fn on_complete(&self, handler: ResultHandler) {
        self.handlers.lock().complete = Some(handler);
    }

    /// Register the handler invoked with a failed result
    pub fn on_error(&self, handler: ResultHandler) {
        self.handlers.lock().error = Some(handler);
    }

    /// Submit the callable if the task is idle; otherwise do nothing
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if !state.is_idle() {
                trace!("Task {} already {}, ignoring start", self.id, state.name());
                return;
            }
            *state = TaskState::Running;
        }

        let Some(action) = self.action.lock().take() else {
            return;
        };

        debug!("Submitting task {}", self.id);
        let handle = TaskHandle {
            task: Some(Arc::clone(self)),
        };
        self.dispatcher.submit(Box::new(move || action(handle)));
    }

    /// Cancel the task if it is idle; running or finished tasks are unaffected
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock();
            if !state.is_idle() {
                trace!("Task {} already {}, ignoring cancel", self.id, state.name());
                return;
            }
            *state = TaskState::Cancelled;
        }

        self.action.lock().take();
        debug!("Cancelled task {}", self.id);
        (self.on_end)(TaskState::Cancelled);
    }

    fn finish(&self, state: TaskState) {
        {
            let mut current = self.state.lock();
            if !current.is_running() {
                warn!(
                    "Task {} reported {} while {}, ignoring",
                    self.id,
                    state.name(),
                    current.name()
                );
                return;
            }
            *current = state.clone();
        }

        let handlers = self.handlers.lock().clone();
        match &state {
            TaskState::Completed(result) => {
                if let Some(complete) = handlers.complete {
                    complete(result.clone());
                }
            }
            TaskState::Failed(result) => {
                if let Some(error) = handlers.error {
                    error(result.clone());
                }
            }
            _ => {}
        }

        debug!("Task {} finished: {}", self.id, state.name());
        (self.on_end)(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Reporting handle passed to a task's callable.
///
/// Reporting consumes the handle, so an outcome is reported at most once.
/// Dropping it without reporting leaves the task running forever and
/// stalls any chain waiting on it.
pub struct TaskHandle {
    task: Option<Arc<Task>>,
}

impl TaskHandle {
    /// Id of the task this handle reports for
    pub fn task_id(&self) -> Option<TaskId> {
        self.task.as_ref().map(|task| task.id)
    }

    /// Report success
    pub fn complete(mut self, result: TaskResult) {
        if let Some(task) = self.task.take() {
            task.finish(TaskState::Completed(result));
        }
    }

    /// Report success with a plain 200 result
    pub fn succeed(self) {
        self.complete(TaskResult::success());
    }

    /// Report failure
    pub fn fail(mut self, result: TaskResult) {
        if let Some(task) = self.task.take() {
            task.finish(TaskState::Failed(result));
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!("Task {} handle dropped without reporting an outcome", task.id);
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id())
            .finish()
    }
}
