use crate::env::SUCCESS_CODE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::unit::TaskHandle;

/// Unique identifier for executors, used in log events
pub type TaskId = Uuid;

/// Callable wrapped by a unit. It must report through the handle exactly once.
pub type TaskAction = Box<dyn FnOnce(TaskHandle) + Send + 'static>;

/// Handler receiving a completion or error result
pub type ResultHandler = Arc<dyn Fn(TaskResult) + Send + Sync + 'static>;

/// End-of-lifecycle hook, fired once with the terminal state
pub type EndHook = Arc<dyn Fn(TaskState) + Send + Sync + 'static>;

/// Outcome reported by a unit, or synthesized by an aggregate join
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskResult {
    /// Status code, 200 on success by convention
    pub code: i64,
    pub message: String,
    /// Opaque payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Sub-results, only filled by aggregates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TaskResult>,
}

/// Lifecycle state of an executor
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub enum TaskState {
    /// Created but not started; the only state `start` and `cancel` act on
    #[default]
    Idle,
    /// Submitted and waiting for its outcome
    Running,
    /// A unit reported success
    Completed(TaskResult),
    /// A unit reported failure
    Failed(TaskResult),
    /// Cancelled while idle
    Cancelled,
    /// Every unit of an aggregate finished
    CompletedAll(Vec<TaskResult>),
}

impl TaskResult {
    /// Create a result with the given code
    pub fn new(code: i64) -> Self {
        Self {
            code,
            message: String::new(),
            data: None,
            results: Vec::new(),
        }
    }

    /// Plain success (code 200)
    pub fn success() -> Self {
        Self::new(SUCCESS_CODE)
    }

    /// Failure with a code and message
    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self::new(code).with_message(message)
    }

    /// Composite success wrapping the results of an aggregate
    pub fn results(results: Vec<TaskResult>) -> Self {
        Self {
            results,
            ..Self::success()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Check whether the code is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl Default for TaskResult {
    fn default() -> Self {
        Self::success()
    }
}

impl TaskState {
    /// Completed state carrying a 200 result with optional payload
    pub fn success(data: Option<serde_json::Value>) -> Self {
        let mut result = TaskResult::success();
        result.data = data;
        TaskState::Completed(result)
    }

    /// Failed state with the given code, message and payload
    pub fn error(code: i64, message: Option<&str>, data: Option<serde_json::Value>) -> Self {
        let mut result = TaskResult::failure(code, message.unwrap_or_default());
        result.data = data;
        TaskState::Failed(result)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, TaskState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Check if the state is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Idle | TaskState::Running)
    }

    /// Check if the state lets a successor start
    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Completed(_) | TaskState::CompletedAll(_))
    }

    /// Result carried by a unit's terminal state
    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            TaskState::Completed(result) | TaskState::Failed(result) => Some(result),
            _ => None,
        }
    }

    /// Short name for log events and errors
    pub fn name(&self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Completed(_) => "completed",
            TaskState::Failed(_) => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::CompletedAll(_) => "completed_all",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_constructors() {
        let ok = TaskResult::success();
        assert_eq!(ok.code, 200);
        assert!(ok.message.is_empty());
        assert!(ok.is_success());

        let failed = TaskResult::failure(500, "boom").with_data(json!({"retry": false}));
        assert_eq!(failed.code, 500);
        assert_eq!(failed.message, "boom");
        assert_eq!(failed.data, Some(json!({"retry": false})));
        assert!(!failed.is_success());
    }

    #[test]
    fn test_composite_result_keeps_order() {
        let composite = TaskResult::results(vec![TaskResult::new(500), TaskResult::new(200)]);
        assert_eq!(composite.code, 200);
        let codes: Vec<i64> = composite.results.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![500, 200]);
    }

    #[test]
    fn test_state_classification() {
        assert!(TaskState::Idle.is_idle());
        assert_eq!(TaskState::default(), TaskState::Idle);
        assert!(!TaskState::Idle.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Cancelled.is_success());
        assert!(TaskState::CompletedAll(vec![]).is_success());
        assert!(TaskState::success(None).is_success());
        assert!(!TaskState::error(404, Some("missing"), None).is_success());
    }

    #[test]
    fn test_state_shorthands() {
        let state = TaskState::error(404, Some("missing"), Some(json!("key")));
        let result = state.result().cloned().unwrap();
        assert_eq!(result.code, 404);
        assert_eq!(result.message, "missing");
        assert_eq!(result.data, Some(json!("key")));

        let state = TaskState::success(Some(json!(1)));
        assert_eq!(state.result().unwrap().data, Some(json!(1)));
        assert!(TaskState::CompletedAll(vec![]).result().is_none());
    }

    #[test]
    fn test_result_serialization_skips_empty_fields() {
        let json = serde_json::to_value(TaskResult::success()).unwrap();
        assert_eq!(json, json!({"code": 200, "message": ""}));

        let parsed: TaskResult =
            serde_json::from_value(json!({"code": 201, "message": "ok"})).unwrap();
        assert_eq!(parsed, TaskResult::new(201).with_message("ok"));
    }
}
