//! Submission of unit callables for asynchronous execution.
//!
//! A [`Dispatcher`] is fire-and-forget: `submit` returns immediately and
//! gives no ordering guarantee relative to other submissions. The crate
//! never waits on submitted work; units report back through their
//! [`TaskHandle`](crate::task::TaskHandle).

pub mod config;

pub use config::{DispatchBackend, DispatcherConfig};

use crate::error::{Result, TaskError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, warn};

/// Unit of submitted work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes submitted jobs asynchronously
pub trait Dispatcher: Send + Sync {
    fn submit(&self, job: Job);
}

/// Runs jobs on the blocking pool of a tokio runtime
pub struct TokioDispatcher {
    handle: Handle,
    // Owned runtime; `None` when borrowing a handle.
    runtime: Option<Runtime>,
}

impl TokioDispatcher {
    /// Build a dedicated multi-thread runtime from the configuration
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Dispatch onto an existing runtime
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
        }
    }

    /// Dispatch onto the runtime the caller is running in
    pub fn current() -> Result<Self> {
        Ok(Self::from_handle(Handle::try_current()?))
    }
}

impl Dispatcher for TokioDispatcher {
    fn submit(&self, job: Job) {
        // Callables are synchronous and may block.
        drop(self.handle.spawn_blocking(job));
    }
}

impl Drop for TokioDispatcher {
    fn drop(&mut self) {
        // The last reference is often released by a job on this runtime's
        // own blocking pool, where a waiting shutdown would never return.
        if let Some(runtime) = self.runtime.take() {
            debug!("Shutting down owned dispatcher runtime");
            runtime.shutdown_background();
        }
    }
}

/// Runs each job on its own named OS thread
pub struct ThreadDispatcher {
    thread_name: String,
    spawned: AtomicUsize,
}

impl ThreadDispatcher {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            spawned: AtomicUsize::new(0),
        }
    }
}

impl Dispatcher for ThreadDispatcher {
    fn submit(&self, job: Job) {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.thread_name, n);
        if let Err(err) = std::thread::Builder::new().name(name.clone()).spawn(job) {
            error!("Failed to spawn dispatcher thread {}: {}", name, err);
        }
    }
}

/// Runs each job on the submitting thread before `submit` returns
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn submit(&self, job: Job) {
        job();
    }
}

/// Holds jobs until they are run explicitly.
///
/// Lets callers step a chain deterministically.
#[derive(Default)]
pub struct QueuedDispatcher {
    pub(crate) jobs: Mutex<VecDeque<Job>>,
    submitted: AtomicUsize,
}

impl QueuedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of jobs ever submitted
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Number of jobs waiting to run
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run the oldest waiting job, returning false if there was none
    pub fn run_next(&self) -> bool {
        // Pop under the lock, run without it: jobs may submit more jobs.
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until the queue is empty, including ones submitted meanwhile
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Dispatcher for QueuedDispatcher {
    fn submit(&self, job: Job) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().push_back(job);
    }
}

/// Build a dispatcher for the configured backend
pub fn build(config: &DispatcherConfig) -> Result<Arc<dyn Dispatcher>> {
    config.validate()?;
    let dispatcher: Arc<dyn Dispatcher> = match config.backend {
        DispatchBackend::Tokio => Arc::new(TokioDispatcher::new(config)?),
        DispatchBackend::Threads => Arc::new(ThreadDispatcher::new(config.thread_name.clone())),
    };
    debug!("Built {:?} dispatcher", config.backend);
    Ok(dispatcher)
}

static SHARED: OnceLock<Arc<dyn Dispatcher>> = OnceLock::new();

/// Install the process-wide dispatcher.
///
/// Must run before the first call to [`shared`]; fails with
/// [`TaskError::AlreadyInstalled`] afterwards.
pub fn install(config: &DispatcherConfig) -> Result<()> {
    if SHARED.get().is_some() {
        return Err(TaskError::AlreadyInstalled);
    }
    let dispatcher = build(config)?;
    SHARED
        .set(dispatcher)
        .map_err(|_| TaskError::AlreadyInstalled)
}

/// Process-wide dispatcher.
///
/// Unless [`install`] ran first, it is built on first use from
/// [`DispatcherConfig::discover`], so `TASKCHAIN_CONFIG` and a local
/// `taskchain.toml` are honored. Discovery or build failures fall back to
/// one thread per callable.
pub fn shared() -> Arc<dyn Dispatcher> {
    SHARED.get_or_init(init_shared).clone()
}

fn init_shared() -> Arc<dyn Dispatcher> {
    let config = DispatcherConfig::discover().unwrap_or_else(|err| {
        warn!("Failed to discover dispatcher configuration ({}), using defaults", err);
        DispatcherConfig::default()
    });
    build(&config).unwrap_or_else(|err| {
        warn!(
            "Failed to build {:?} dispatcher ({}), falling back to threads",
            config.backend, err
        );
        let fallback: Arc<dyn Dispatcher> = Arc::new(ThreadDispatcher::new(config.thread_name));
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_inline_runs_before_returning() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        InlineDispatcher.submit(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_queued_defers_until_run() {
        let queue = Arc::new(QueuedDispatcher::new());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            queue.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(queue.submitted(), 3);
        assert_eq!(queue.pending(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert!(queue.run_next());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(queue.run_all(), 2);
        assert!(!queue.run_next());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_queued_runs_jobs_submitted_by_jobs() {
        let queue = Arc::new(QueuedDispatcher::new());
        let inner = queue.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let nested = counter.clone();

        queue.submit(Box::new(move || {
            inner.submit(Box::new(move || {
                nested.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        assert_eq!(queue.run_all(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_dispatcher_runs_job() {
        let (tx, rx) = std::sync::mpsc::channel();
        ThreadDispatcher::new("test-worker").submit(Box::new(move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        }));
        let name = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("test-worker-0"));
    }

    #[test]
    fn test_tokio_dispatcher_runs_job() {
        let config = DispatcherConfig::default().with_worker_threads(1);
        let dispatcher = TokioDispatcher::new(&config).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        dispatcher.submit(Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_tokio_current_requires_runtime() {
        assert!(matches!(
            TokioDispatcher::current(),
            Err(TaskError::NoRuntime(_))
        ));
    }

    #[test]
    fn test_owned_runtime_released_by_its_own_job() {
        let config = DispatcherConfig::default().with_worker_threads(1);
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(TokioDispatcher::new(&config).unwrap());
        let (tx, rx) = std::sync::mpsc::channel();

        let owned = dispatcher.clone();
        dispatcher.submit(Box::new(move || {
            // Last reference goes away on the runtime's blocking pool.
            std::thread::sleep(std::time::Duration::from_millis(50));
            drop(owned);
            tx.send("after drop").unwrap();
        }));
        drop(dispatcher);

        let message = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(message, "after drop");
    }

    #[tokio::test]
    async fn test_owned_runtime_dropped_in_async_context() {
        let config = DispatcherConfig::default().with_worker_threads(1);
        let dispatcher = TokioDispatcher::new(&config).unwrap();
        drop(dispatcher);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = DispatcherConfig::default().with_max_blocking_threads(0);
        assert!(matches!(build(&config), Err(TaskError::InvalidConfig(_))));
    }
}
