//! # taskchain
//!
//! Compose sequential and parallel units of asynchronous work, attach
//! completion and error handlers, and cancel work that has not started.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: the executor state machines. A [`Task`] runs one callable;
//!   a [`MultiTask`] runs many concurrently and joins on all of them.
//! - **[`chain`]**: [`AsyncTask`] nodes linking one executor's completion to
//!   the start of the next, and relaying errors to the nearest handler.
//! - **[`dispatch`]**: where callables actually run. The process-wide
//!   dispatcher uses the blocking pool of a tokio runtime by default.
//!
//! Every executor moves `Idle → Running → terminal` exactly once. Handlers
//! run without any executor lock held, so a handler may start or cancel
//! other nodes, including ones of its own chain.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskchain::{AsyncTask, TaskResult, task::action};
//!
//! let root = AsyncTask::pending(|handle| handle.complete(TaskResult::new(200)));
//! root.nexts(vec![
//!         action(|handle| handle.succeed()),
//!         action(|handle| handle.fail(TaskResult::failure(500, "disk full"))),
//!     ])
//!     .complete(|joined| println!("{} results", joined.results.len()))
//!     .error(|failed| eprintln!("unit failed: {}", failed.message));
//! root.start();
//! ```

/// Task results, states and executors.
pub mod task;

/// Chain controller and error relay.
pub mod chain;

/// Execution of submitted callables.
pub mod dispatch;

/// Error types for API misuse and configuration.
pub mod error;

/// Configuration file and environment names.
pub mod env;

pub use chain::{AsyncTask, ChainBuilder, NodeId};
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use error::TaskError;
pub use task::{MultiTask, Task, TaskAction, TaskExecutor, TaskHandle, TaskResult, TaskState};
