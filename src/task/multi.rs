//! Fan-out/join aggregate of units.
//!
//! A [`MultiTask`] starts all of its units concurrently and joins once
//! every unit has finished. The join always produces
//! [`TaskState::CompletedAll`] with every unit's result in insertion
//! order; an aggregate has no notion of partial failure.

use crate::dispatch::Dispatcher;
use crate::error::{Result, TaskError};
use crate::task::types::*;
use crate::task::unit::Task;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Clone, Default)]
struct Handlers {
    complete: Option<ResultHandler>,
    each: Option<ResultHandler>,
    error: Option<ResultHandler>,
}

struct JoinState {
    state: TaskState,
    /// Units that reached a terminal state
    finished: usize,
    /// One slot per unit, filled as units finish
    results: Vec<Option<TaskResult>>,
}

/// Shared between the aggregate and its units' hooks. Holds no units.
struct JoinCore {
    id: TaskId,
    join: Mutex<JoinState>,
    handlers: Mutex<Handlers>,
    on_end: EndHook,
}

/// Aggregate executor
pub struct MultiTask {
    core: Arc<JoinCore>,
    units: Mutex<Vec<Arc<Task>>>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl MultiTask {
    /// Create an idle, empty aggregate
    pub fn new(dispatcher: Arc<dyn Dispatcher>, on_end: EndHook) -> Arc<Self> {
        Arc::new(Self {
            core: Arc::new(JoinCore {
                id: Uuid::new_v4(),
                join: Mutex::new(JoinState {
                    state: TaskState::Idle,
                    finished: 0,
                    results: Vec::new(),
                }),
                handlers: Mutex::new(Handlers::default()),
                on_end,
            }),
            units: Mutex::new(Vec::new()),
            dispatcher,
        })
    }

    pub fn id(&self) -> TaskId {
        self.core.id
    }

    /// Snapshot of the aggregate state
    pub fn state(&self) -> TaskState {
        self.core.join.lock().state.clone()
    }

    /// Number of units added so far
    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register the handler invoked once with the composite join result
    pub fn on_complete(&self, handler: ResultHandler) {
        self.core.handlers.lock().complete = Some(handler);
    }

    /// Register the handler invoked with each unit's successful result
    pub fn on_each(&self, handler: ResultHandler) {
        self.core.handlers.lock().each = Some(handler);
    }

    /// Register the handler invoked with each unit's failed result
    pub fn on_error(&self, handler: ResultHandler) {
        self.core.handlers.lock().error = Some(handler);
    }

    /// Add a unit; only allowed while the aggregate is idle
    pub fn add(&self, action: TaskAction) -> Result<()> {
        let mut join = self.core.join.lock();
        if !join.state.is_idle() {
            return Err(TaskError::NotIdle {
                state: join.state.name(),
            });
        }

        let index = join.results.len();
        join.results.push(None);

        let core = Arc::clone(&self.core);
        let unit = Task::new(
            action,
            Arc::clone(&self.dispatcher),
            Arc::new(move |state: TaskState| core.unit_finished(index, state)),
        );

        let core = Arc::clone(&self.core);
        unit.on_complete(Arc::new(move |result: TaskResult| {
            let each = core.handlers.lock().each.clone();
            if let Some(each) = each {
                each(result);
            }
        }));

        let core = Arc::clone(&self.core);
        unit.on_error(Arc::new(move |result: TaskResult| {
            let error = core.handlers.lock().error.clone();
            if let Some(error) = error {
                error(result);
            }
        }));

        // Pushed under the join lock so `start` never sees a partial add.
        self.units.lock().push(unit);
        trace!("Added unit {} to aggregate {}", index, self.core.id);
        Ok(())
    }

    /// Start the aggregate and every unit.
    ///
    /// Idempotent while running; does nothing once terminal.
    pub fn start(&self) {
        let units = {
            let mut join = self.core.join.lock();
            if join.state.is_idle() {
                join.state = TaskState::Running;
            } else if !join.state.is_running() {
                trace!(
                    "Aggregate {} already {}, ignoring start",
                    self.core.id,
                    join.state.name()
                );
                return;
            }
            self.units.lock().clone()
        };

        debug!("Starting aggregate {} with {} units", self.core.id, units.len());
        if units.is_empty() {
            self.core.try_join();
            return;
        }

        for unit in units {
            unit.start();
        }
    }

    /// Cancel the aggregate and all of its units if it is idle
    pub fn cancel(&self) {
        let units = {
            let mut join = self.core.join.lock();
            if !join.state.is_idle() {
                trace!(
                    "Aggregate {} already {}, ignoring cancel",
                    self.core.id,
                    join.state.name()
                );
                return;
            }
            join.state = TaskState::Cancelled;
            self.units.lock().clone()
        };

        for unit in units {
            unit.cancel();
        }

        debug!("Cancelled aggregate {}", self.core.id);
        (self.core.on_end)(TaskState::Cancelled);
    }
}

impl JoinCore {
    fn unit_finished(&self, index: usize, state: TaskState) {
        {
            let mut join = self.join.lock();
            join.finished += 1;
            debug_assert!(join.finished <= join.results.len());
            if let (Some(result), Some(slot)) = (state.result(), join.results.get_mut(index)) {
                *slot = Some(result.clone());
            }
        }
        self.try_join();
    }

    fn try_join(&self) {
        let list = {
            let mut join = self.join.lock();
            if !join.state.is_running() || join.finished < join.results.len() {
                return;
            }
            let list: Vec<TaskResult> = join.results.iter().flatten().cloned().collect();
            join.state = TaskState::CompletedAll(list.clone());
            list
        };

        debug!("Aggregate {} joined {} results", self.id, list.len());
        let complete = self.handlers.lock().complete.clone();
        if let Some(complete) = complete {
            complete(TaskResult::results(list.clone()));
        }
        (self.on_end)(TaskState::CompletedAll(list));
    }
}

impl fmt::Debug for MultiTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = self.core.join.lock();
        f.debug_struct("MultiTask")
            .field("id", &self.core.id)
            .field("state", &join.state)
            .field("finished", &join.finished)
            .field("units", &join.results.len())
            .finish()
    }
}

/// Log and drop an add that the aggregate refused
pub(crate) fn add_or_warn(multi: &MultiTask, action: TaskAction) {
    if let Err(err) = multi.add(action) {
        warn!("MultiTask {}: {}", multi.id(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{InlineDispatcher, QueuedDispatcher};
    use crate::task::unit::TaskHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook() -> (Arc<Mutex<Vec<TaskState>>>, EndHook) {
        let ends = Arc::new(Mutex::new(Vec::new()));
        let sink = ends.clone();
        (ends, Arc::new(move |state: TaskState| sink.lock().push(state)))
    }

    fn report(code: i64) -> TaskAction {
        Box::new(move |handle: TaskHandle| {
            if code < 400 {
                handle.complete(TaskResult::new(code));
            } else {
                handle.fail(TaskResult::new(code));
            }
        })
    }

    #[test]
    fn test_join_fires_once_in_insertion_order() {
        let queue = Arc::new(QueuedDispatcher::new());
        let (ends, hook) = counting_hook();
        let multi = MultiTask::new(queue.clone(), hook);
        for code in [200, 201, 202] {
            multi.add(report(code)).unwrap();
        }

        let completions = Arc::new(Mutex::new(Vec::new()));
        let sink = completions.clone();
        multi.on_complete(Arc::new(move |result: TaskResult| sink.lock().push(result)));

        multi.start();
        assert_eq!(queue.submitted(), 3);

        // Run in reverse to show the join ignores completion order.
        let jobs: Vec<_> = std::iter::from_fn(|| queue.jobs.lock().pop_back()).collect();
        for job in jobs {
            job();
        }

        let expected = vec![TaskResult::new(200), TaskResult::new(201), TaskResult::new(202)];
        assert_eq!(multi.state(), TaskState::CompletedAll(expected.clone()));
        assert_eq!(*completions.lock(), vec![TaskResult::results(expected.clone())]);
        assert_eq!(*ends.lock(), vec![TaskState::CompletedAll(expected)]);
    }

    #[test]
    fn test_mixed_outcomes_still_complete_all() {
        let (ends, hook) = counting_hook();
        let multi = MultiTask::new(Arc::new(InlineDispatcher), hook);
        multi.add(report(500)).unwrap();
        multi.add(report(200)).unwrap();

        let errors = Arc::new(AtomicUsize::new(0));
        let each = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));
        let (e, s, c) = (errors.clone(), each.clone(), completions.clone());
        multi.on_error(Arc::new(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }));
        multi.on_each(Arc::new(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        multi.on_complete(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        multi.start();

        let expected = vec![TaskResult::new(500), TaskResult::new(200)];
        assert_eq!(multi.state(), TaskState::CompletedAll(expected.clone()));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(each.load(Ordering::SeqCst), 1);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(*ends.lock(), vec![TaskState::CompletedAll(expected)]);
    }

    #[test]
    fn test_add_after_start_is_rejected() {
        let queue = Arc::new(QueuedDispatcher::new());
        let (_, hook) = counting_hook();
        let multi = MultiTask::new(queue.clone(), hook);
        multi.add(report(200)).unwrap();
        multi.start();

        let err = multi.add(report(200)).unwrap_err();
        assert!(matches!(err, TaskError::NotIdle { state: "running" }));
        assert_eq!(multi.len(), 1);

        queue.run_all();
        assert_eq!(
            multi.state(),
            TaskState::CompletedAll(vec![TaskResult::new(200)])
        );
    }

    #[test]
    fn test_start_twice_submits_each_unit_once() {
        let queue = Arc::new(QueuedDispatcher::new());
        let (ends, hook) = counting_hook();
        let multi = MultiTask::new(queue.clone(), hook);
        multi.add(report(200)).unwrap();
        multi.add(report(200)).unwrap();

        multi.start();
        multi.start();
        assert_eq!(queue.submitted(), 2);

        queue.run_all();
        assert_eq!(ends.lock().len(), 1);
    }

    #[test]
    fn test_cancel_idle_cancels_units() {
        let queue = Arc::new(QueuedDispatcher::new());
        let (ends, hook) = counting_hook();
        let multi = MultiTask::new(queue.clone(), hook);
        multi.add(report(200)).unwrap();
        multi.add(report(200)).unwrap();

        multi.cancel();
        multi.start();

        assert_eq!(multi.state(), TaskState::Cancelled);
        assert_eq!(queue.submitted(), 0);
        assert_eq!(*ends.lock(), vec![TaskState::Cancelled]);
        assert!(matches!(
            multi.add(report(200)),
            Err(TaskError::NotIdle { state: "cancelled" })
        ));
    }

    #[test]
    fn test_cancel_while_running_is_noop() {
        let queue = Arc::new(QueuedDispatcher::new());
        let (ends, hook) = counting_hook();
        let multi = MultiTask::new(queue.clone(), hook);
        multi.add(report(200)).unwrap();

        multi.start();
        multi.cancel();
        queue.run_all();

        assert_eq!(
            *ends.lock(),
            vec![TaskState::CompletedAll(vec![TaskResult::new(200)])]
        );
    }

    #[test]
    fn test_empty_aggregate_joins_on_start() {
        let (ends, hook) = counting_hook();
        let multi = MultiTask::new(Arc::new(InlineDispatcher), hook);
        assert!(multi.is_empty());

        multi.start();
        assert_eq!(multi.state(), TaskState::CompletedAll(vec![]));
        assert_eq!(*ends.lock(), vec![TaskState::CompletedAll(vec![])]);
    }
}
