//! Task outcomes and the completion channel returned by `submit`

use crate::error::{McpError, McpResult};
use crate::protocol::{HandlerType, Task, TaskStatus};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;

/// What happened when one resolved handler was dispatched
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum HandlerRunOutcome {
    Succeeded(Value),
    Failed(String),
    /// No live handler was registered for the type
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerRun {
    pub handler_type: HandlerType,
    pub outcome: HandlerRunOutcome,
}

impl HandlerRun {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, HandlerRunOutcome::Failed(_))
    }
}

/// Terminal state of a drained task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    /// The task with status, completion time and result filled in
    pub task: Task,
    /// One entry per resolved handler type, in resolution order
    pub runs: Vec<HandlerRun>,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        self.task.effective_status()
    }

    pub fn succeeded(&self) -> bool {
        self.status() == TaskStatus::Completed
    }

    pub fn run_for(&self, handler_type: HandlerType) -> Option<&HandlerRun> {
        self.runs.iter().find(|run| run.handler_type == handler_type)
    }
}

/// Result object stored on a task: handler type -> outcome
pub(crate) fn runs_to_result(runs: &[HandlerRun]) -> Value {
    let mut result = Map::new();
    for run in runs {
        let entry = match &run.outcome {
            HandlerRunOutcome::Succeeded(value) => value.clone(),
            HandlerRunOutcome::Failed(reason) => json!({ "error": reason }),
            HandlerRunOutcome::Skipped => json!({ "skipped": true }),
        };
        result.insert(run.handler_type.to_string(), entry);
    }
    Value::Object(result)
}

/// Receiver side of a submitted task's completion
///
/// Dropping the handle is fine; the task still drains and is recorded by
/// the monitor.
#[derive(Debug)]
pub struct CompletionHandle {
    task_id: String,
    receiver: oneshot::Receiver<TaskOutcome>,
}

impl CompletionHandle {
    pub(crate) fn new(task_id: String, receiver: oneshot::Receiver<TaskOutcome>) -> Self {
        Self { task_id, receiver }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wait for the task to reach a terminal state
    pub async fn wait(self) -> McpResult<TaskOutcome> {
        let task_id = self.task_id;
        self.receiver.await.map_err(|_| {
            McpError::internal_error(format!(
                "orchestrator dropped task {task_id} before completion"
            ))
        })
    }
}
