//! Sequential composition of executors.
//!
//! An [`AsyncTask`] is one node of a chain. It owns its executor (a single
//! unit or an aggregate) and at most one successor. When the executor
//! reaches a terminal state the successor is started on success and
//! cancelled on failure or cancellation, then released.
//!
//! ```rust,no_run
//! use taskchain::{AsyncTask, TaskResult};
//!
//! let root = AsyncTask::pending(|handle| handle.complete(TaskResult::new(200)))
//!     .complete(|result| println!("first: {}", result.code));
//! root.next(|handle| handle.fail(TaskResult::failure(500, "down")))
//!     .next(|handle| handle.succeed())
//!     .error(|result| eprintln!("chain failed: {}", result.message));
//! root.start();
//! ```

pub mod routes;

pub use routes::NodeId;

use crate::dispatch::{self, Dispatcher};
use crate::error::TaskError;
use crate::task::multi::{MultiTask, add_or_warn};
use crate::task::{
    EndHook, Task, TaskAction, TaskExecutor, TaskHandle, TaskId, TaskResult, TaskState,
};
use parking_lot::Mutex;
use routes::ErrorRoutes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Default)]
struct LinkState {
    next: Option<AsyncTask>,
    /// Set once the owning executor has ended
    ended: Option<TaskState>,
}

/// Successor slot of a node, shared with the node's executor hook
#[derive(Default)]
struct Link {
    inner: Mutex<LinkState>,
}

impl Link {
    fn hook(self: &Arc<Self>) -> EndHook {
        let link = Arc::clone(self);
        Arc::new(move |state: TaskState| link.advance(state))
    }

    fn advance(&self, state: TaskState) {
        let next = {
            let mut inner = self.inner.lock();
            inner.ended = Some(state.clone());
            inner.next.take()
        };
        if let Some(next) = next {
            next.follow(&state);
        }
    }

    fn attach(&self, next: AsyncTask) {
        let ended = {
            let mut inner = self.inner.lock();
            match inner.ended.clone() {
                Some(state) => state,
                None => {
                    if let Some(replaced) = inner.next.replace(next) {
                        debug!("Replaced successor node {} before it started", replaced.id());
                    }
                    return;
                }
            }
        };
        // The predecessor already ended; apply its outcome right away.
        next.follow(&ended);
    }
}

struct Node {
    id: NodeId,
    executor: TaskExecutor,
    link: Arc<Link>,
    routes: Arc<ErrorRoutes>,
    dispatcher: Arc<dyn Dispatcher>,
}

/// Chain node handle.
///
/// Cloning is cheap and yields another handle to the same node. A running
/// chain keeps its own nodes alive, so handles may be dropped freely.
#[derive(Clone)]
pub struct AsyncTask {
    node: Arc<Node>,
}

/// Builds chain roots on an explicit dispatcher
#[derive(Clone)]
pub struct ChainBuilder {
    dispatcher: Arc<dyn Dispatcher>,
}

impl ChainBuilder {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Root node running `action`, started immediately
    pub fn task<F>(&self, action: F) -> AsyncTask
    where
        F: FnOnce(TaskHandle) + Send + 'static,
    {
        let root = self.pending(action);
        root.start();
        root
    }

    /// Root node running `actions` concurrently, started immediately
    pub fn tasks<I>(&self, actions: I) -> AsyncTask
    where
        I: IntoIterator<Item = TaskAction>,
    {
        let root = self.pending_tasks(actions);
        root.start();
        root
    }

    /// Root node running `action`, not yet started
    pub fn pending<F>(&self, action: F) -> AsyncTask
    where
        F: FnOnce(TaskHandle) + Send + 'static,
    {
        AsyncTask::single(
            Arc::new(ErrorRoutes::default()),
            Arc::clone(&self.dispatcher),
            None,
            Box::new(action),
        )
    }

    /// Root node running `actions` concurrently, not yet started
    pub fn pending_tasks<I>(&self, actions: I) -> AsyncTask
    where
        I: IntoIterator<Item = TaskAction>,
    {
        AsyncTask::multi(
            Arc::new(ErrorRoutes::default()),
            Arc::clone(&self.dispatcher),
            None,
            actions,
        )
    }
}

impl AsyncTask {
    /// Start a chain with one unit on the shared dispatcher
    pub fn task<F>(action: F) -> Self
    where
        F: FnOnce(TaskHandle) + Send + 'static,
    {
        ChainBuilder::new(dispatch::shared()).task(action)
    }

    /// Start a chain with an aggregate on the shared dispatcher
    pub fn tasks<I>(actions: I) -> Self
    where
        I: IntoIterator<Item = TaskAction>,
    {
        ChainBuilder::new(dispatch::shared()).tasks(actions)
    }

    /// Like [`AsyncTask::task`], but the root waits for [`AsyncTask::start`]
    pub fn pending<F>(action: F) -> Self
    where
        F: FnOnce(TaskHandle) + Send + 'static,
    {
        ChainBuilder::new(dispatch::shared()).pending(action)
    }

    /// Like [`AsyncTask::tasks`], but the root waits for [`AsyncTask::start`]
    pub fn pending_tasks<I>(actions: I) -> Self
    where
        I: IntoIterator<Item = TaskAction>,
    {
        ChainBuilder::new(dispatch::shared()).pending_tasks(actions)
    }

    /// Build chains on a specific dispatcher
    pub fn with_dispatcher(dispatcher: Arc<dyn Dispatcher>) -> ChainBuilder {
        ChainBuilder::new(dispatcher)
    }

    fn single(
        routes: Arc<ErrorRoutes>,
        dispatcher: Arc<dyn Dispatcher>,
        parent: Option<NodeId>,
        action: TaskAction,
    ) -> Self {
        let id = routes.register_node(parent);
        let link = Arc::new(Link::default());
        let task = Task::new(action, Arc::clone(&dispatcher), link.hook());
        task.on_error(routes.router(id));
        trace!("Chain node {} wraps task {}", id, task.id());

        Self::from_parts(id, TaskExecutor::Single(task), link, routes, dispatcher)
    }

    fn multi<I>(
        routes: Arc<ErrorRoutes>,
        dispatcher: Arc<dyn Dispatcher>,
        parent: Option<NodeId>,
        actions: I,
    ) -> Self
    where
        I: IntoIterator<Item = TaskAction>,
    {
        let id = routes.register_node(parent);
        let link = Arc::new(Link::default());
        let multi = MultiTask::new(Arc::clone(&dispatcher), link.hook());
        multi.on_error(routes.router(id));
        for action in actions {
            add_or_warn(&multi, action);
        }
        trace!("Chain node {} wraps aggregate {}", id, multi.id());

        Self::from_parts(id, TaskExecutor::Multi(multi), link, routes, dispatcher)
    }

    fn from_parts(
        id: NodeId,
        executor: TaskExecutor,
        link: Arc<Link>,
        routes: Arc<ErrorRoutes>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            node: Arc::new(Node {
                id,
                executor,
                link,
                routes,
                dispatcher,
            }),
        }
    }

    /// Append a unit that starts once this node completes.
    ///
    /// Returns the new node. Calling `next` again replaces a successor that
    /// has not started yet.
    pub fn next<F>(&self, action: F) -> AsyncTask
    where
        F: FnOnce(TaskHandle) + Send + 'static,
    {
        let next = Self::single(
            Arc::clone(&self.node.routes),
            Arc::clone(&self.node.dispatcher),
            Some(self.node.id),
            Box::new(action),
        );
        self.node.link.attach(next.clone());
        next
    }

    /// Append an aggregate that starts once this node completes
    pub fn nexts<I>(&self, actions: I) -> AsyncTask
    where
        I: IntoIterator<Item = TaskAction>,
    {
        let next = Self::multi(
            Arc::clone(&self.node.routes),
            Arc::clone(&self.node.dispatcher),
            Some(self.node.id),
            actions,
        );
        self.node.link.attach(next.clone());
        next
    }

    /// Handle this node's successful result.
    ///
    /// For an aggregate node the handler runs once, with the composite
    /// result of the join.
    pub fn complete<F>(self, handler: F) -> Self
    where
        F: Fn(TaskResult) + Send + Sync + 'static,
    {
        self.node.executor.on_complete(Arc::new(handler));
        self
    }

    /// Handle errors of this node and of earlier nodes without a handler.
    ///
    /// A failure is delivered to the failing node's own handler, or else
    /// to the nearest later node in the chain that has one. Failures with
    /// no handler anywhere are dropped and counted in
    /// [`AsyncTask::unhandled_errors`].
    pub fn error<F>(self, handler: F) -> Self
    where
        F: Fn(TaskResult) + Send + Sync + 'static,
    {
        if self.node.routes.has_handler(self.node.id) {
            debug!("Replacing error handler of chain node {}", self.node.id);
        }
        self.node.routes.set_handler(self.node.id, Arc::new(handler));
        self
    }

    /// Handle each successful unit of an aggregate node as it finishes
    pub fn each<F>(self, handler: F) -> Self
    where
        F: Fn(TaskResult) + Send + Sync + 'static,
    {
        match &self.node.executor {
            TaskExecutor::Multi(multi) => multi.on_each(Arc::new(handler)),
            TaskExecutor::Single(_) => {
                debug!(
                    "Chain node {} is a single task, ignoring each handler",
                    self.node.id
                );
            }
        }
        self
    }

    /// Add a unit to an aggregate node that has not started.
    ///
    /// Refused adds are logged and ignored.
    pub fn add<F>(self, action: F) -> Self
    where
        F: FnOnce(TaskHandle) + Send + 'static,
    {
        match &self.node.executor {
            TaskExecutor::Multi(multi) => add_or_warn(multi, Box::new(action)),
            TaskExecutor::Single(_) => {
                warn!("Chain node {}: {}", self.node.id, TaskError::NotAggregate);
            }
        }
        self
    }

    /// Start this node's executor if it is idle
    pub fn start(&self) -> &Self {
        self.node.executor.start();
        self
    }

    /// Cancel this node's executor if it is idle.
    ///
    /// The successor is cancelled in turn through the end-of-lifecycle hook.
    pub fn cancel(&self) -> &Self {
        self.node.executor.cancel();
        self
    }

    fn follow(&self, state: &TaskState) {
        if state.is_success() {
            trace!("Chain node {} starting after predecessor", self.node.id);
            self.start();
        } else if state.is_terminal() {
            trace!(
                "Chain node {} cancelled, predecessor {}",
                self.node.id,
                state.name()
            );
            self.cancel();
        }
    }

    /// Position of this node in its chain
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// Id of this node's executor
    pub fn task_id(&self) -> TaskId {
        self.node.executor.id()
    }

    pub fn state(&self) -> TaskState {
        self.node.executor.state()
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.node.executor
    }

    /// Errors on this chain that found no handler
    pub fn unhandled_errors(&self) -> usize {
        self.node.routes.unhandled()
    }
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("id", &self.node.id)
            .field("executor", &self.node.executor)
            .finish()
    }
}
