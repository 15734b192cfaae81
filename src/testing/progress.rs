//! Per-task handler progress reported back to the distribution harness

use crate::agent::Handler;
use crate::error::McpResult;
use crate::orchestrator::mcp::panic_message;
use crate::protocol::{HandlerType, Message, Task};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

const ABANDONED_REASON: &str = "Handler stopped before completing";

/// One handler's progress on one test task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRunResult {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// `None` until the handler reports completion
    pub success: Option<bool>,
    pub result: Option<Value>,
}

impl AgentRunResult {
    pub fn is_finished(&self) -> bool {
        self.success.is_some()
    }
}

type RunMap = HashMap<String, BTreeMap<HandlerType, AgentRunResult>>;

/// Shared map from test task id to per-handler progress
///
/// Only tasks registered with [`HarnessProgress::track`] are recorded. Reports
/// arriving after [`HarnessProgress::forget`] are dropped.
#[derive(Debug, Clone, Default)]
pub struct HarnessProgress {
    runs: Arc<Mutex<RunMap>>,
}

impl HarnessProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> MutexGuard<'_, RunMap> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start collecting reports for a task
    pub fn track(&self, task_id: &str) {
        self.runs().entry(task_id.to_string()).or_default();
    }

    pub fn is_tracked(&self, task_id: &str) -> bool {
        self.runs().contains_key(task_id)
    }

    pub fn agent_started(&self, task_id: &str, handler_type: HandlerType) {
        let mut runs = self.runs();
        let Some(task_runs) = runs.get_mut(task_id) else {
            debug!(task_id, handler = %handler_type, "Ignoring start for untracked task");
            return;
        };
        debug!(task_id, handler = %handler_type, "Test agent started");
        task_runs.insert(
            handler_type,
            AgentRunResult {
                start_time: Utc::now(),
                end_time: None,
                success: None,
                result: None,
            },
        );
    }

    pub fn agent_completed(
        &self,
        task_id: &str,
        handler_type: HandlerType,
        success: bool,
        result: Option<Value>,
    ) {
        let mut runs = self.runs();
        let Some(task_runs) = runs.get_mut(task_id) else {
            debug!(task_id, handler = %handler_type, success, "Ignoring completion for untracked task");
            return;
        };
        debug!(task_id, handler = %handler_type, success, "Test agent completed");
        let now = Utc::now();
        let run = task_runs.entry(handler_type).or_insert_with(|| AgentRunResult {
            start_time: now,
            end_time: None,
            success: None,
            result: None,
        });
        run.end_time = Some(now);
        run.success = Some(success);
        run.result = result;
    }

    /// Copy of the progress reported so far for a task
    pub fn results(&self, task_id: &str) -> BTreeMap<HandlerType, AgentRunResult> {
        self.runs().get(task_id).cloned().unwrap_or_default()
    }

    pub fn forget(&self, task_id: &str) {
        self.runs().remove(task_id);
    }
}

/// Reports a failed run unless settled first
///
/// Dropped unsettled when the dispatch future is cancelled, e.g. by the
/// orchestrator's per-handler deadline.
struct PendingReport<'a> {
    progress: &'a HarnessProgress,
    task_id: &'a str,
    handler_type: HandlerType,
    settled: bool,
}

impl<'a> PendingReport<'a> {
    fn new(progress: &'a HarnessProgress, task_id: &'a str, handler_type: HandlerType) -> Self {
        progress.agent_started(task_id, handler_type);
        Self {
            progress,
            task_id,
            handler_type,
            settled: false,
        }
    }

    fn settle(mut self, success: bool, result: Value) {
        self.settled = true;
        self.progress
            .agent_completed(self.task_id, self.handler_type, success, Some(result));
    }
}

impl Drop for PendingReport<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.progress.agent_completed(
                self.task_id,
                self.handler_type,
                false,
                Some(json!({ "error": ABANDONED_REASON })),
            );
        }
    }
}

/// Handler decorator that reports test-task progress to a shared tracker
///
/// Tasks without the test payload flag pass straight through.
pub struct ReportingHandler {
    inner: Arc<dyn Handler>,
    progress: HarnessProgress,
}

impl ReportingHandler {
    pub fn new(inner: Arc<dyn Handler>, progress: HarnessProgress) -> Self {
        Self { inner, progress }
    }
}

impl std::fmt::Debug for ReportingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingHandler")
            .field("handler_type", &self.inner.handler_type())
            .finish()
    }
}

#[async_trait]
impl Handler for ReportingHandler {
    fn handler_type(&self) -> HandlerType {
        self.inner.handler_type()
    }

    async fn process_task(&self, task: &Task) -> McpResult<Value> {
        if !task.is_test_task() {
            return self.inner.process_task(task).await;
        }

        let pending = PendingReport::new(&self.progress, &task.id, self.inner.handler_type());

        match AssertUnwindSafe(self.inner.process_task(task)).catch_unwind().await {
            Ok(Ok(value)) => {
                pending.settle(true, value.clone());
                Ok(value)
            }
            Ok(Err(e)) => {
                pending.settle(false, json!({ "error": e.failure_reason() }));
                Err(e)
            }
            Err(panic) => {
                let reason = format!("handler panicked: {}", panic_message(panic.as_ref()));
                pending.settle(false, json!({ "error": reason }));
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn receive_message(&self, message: &Message) -> McpResult<()> {
        self.inner.receive_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SimulatedHandler;
    use crate::agent::SIMULATE_FAILURE_KEY;
    use crate::protocol::{TaskType, TEST_FLAG_KEY};
    use crate::testing::MockHandler;
    use std::time::Duration;

    fn test_task(id: &str, task_type: TaskType) -> Task {
        Task::new("o", task_type, "test")
            .with_id(id)
            .with_data(TEST_FLAG_KEY, json!(true))
    }

    #[test]
    fn test_progress_tracks_start_and_completion() {
        let progress = HarnessProgress::new();
        progress.track("t1");
        progress.agent_started("t1", HandlerType::Profiling);

        let results = progress.results("t1");
        assert!(!results[&HandlerType::Profiling].is_finished());

        progress.agent_completed("t1", HandlerType::Profiling, true, Some(json!({"ok": true})));
        let run = &progress.results("t1")[&HandlerType::Profiling];
        assert_eq!(run.success, Some(true));
        assert!(run.end_time.is_some());
        assert!(run.end_time.unwrap() >= run.start_time);
    }

    #[test]
    fn test_progress_forget() {
        let progress = HarnessProgress::new();
        progress.track("t1");
        progress.agent_completed("t1", HandlerType::Feedback, false, None);
        assert_eq!(progress.results("t1").len(), 1);

        progress.forget("t1");
        assert!(progress.results("t1").is_empty());
        assert!(!progress.is_tracked("t1"));
    }

    #[test]
    fn test_late_reports_after_forget_are_dropped() {
        let progress = HarnessProgress::new();
        progress.track("t1");
        progress.agent_started("t1", HandlerType::Scheduling);
        progress.forget("t1");

        progress.agent_started("t1", HandlerType::Profiling);
        progress.agent_completed("t1", HandlerType::Scheduling, true, None);

        assert!(!progress.is_tracked("t1"));
        assert!(progress.results("t1").is_empty());
        assert!(progress.runs().is_empty());
    }

    #[test]
    fn test_reports_for_untracked_tasks_are_dropped() {
        let progress = HarnessProgress::new();
        progress.agent_completed("never-tracked", HandlerType::Feedback, true, None);
        assert!(progress.runs().is_empty());
    }

    #[tokio::test]
    async fn test_reporting_handler_ignores_regular_tasks() {
        let progress = HarnessProgress::new();
        let handler = ReportingHandler::new(
            Arc::new(SimulatedHandler::new(HandlerType::Profiling)),
            progress.clone(),
        );
        let task = Task::new("o", TaskType::Profiling, "regular").with_id("plain");
        progress.track("plain");

        handler.process_task(&task).await.unwrap();
        assert!(progress.results("plain").is_empty());
    }

    #[tokio::test]
    async fn test_reporting_handler_reports_failure() {
        let progress = HarnessProgress::new();
        let handler = ReportingHandler::new(
            Arc::new(SimulatedHandler::new(HandlerType::Assessment)),
            progress.clone(),
        );
        let task = test_task("t-fail", TaskType::AssessmentGeneration)
            .with_data(SIMULATE_FAILURE_KEY, json!(["assessment"]));
        progress.track("t-fail");

        assert!(handler.process_task(&task).await.is_err());

        let run = &progress.results("t-fail")[&HandlerType::Assessment];
        assert_eq!(run.success, Some(false));
        assert!(run.result.as_ref().unwrap()["error"].is_string());
    }

    #[tokio::test]
    async fn test_reporting_handler_reports_panic_then_resumes_it() {
        let progress = HarnessProgress::new();
        let handler = ReportingHandler::new(
            Arc::new(MockHandler::panicking(HandlerType::Scheduling, "scheduler exploded")),
            progress.clone(),
        );
        let task = test_task("t-panic", TaskType::FlashcardOptimization);
        progress.track("t-panic");

        let caught = AssertUnwindSafe(handler.process_task(&task))
            .catch_unwind()
            .await;
        assert!(caught.is_err());

        let run = &progress.results("t-panic")[&HandlerType::Scheduling];
        assert_eq!(run.success, Some(false));
        let error = run.result.as_ref().unwrap()["error"].as_str().unwrap();
        assert!(error.contains("scheduler exploded"), "{error}");
    }

    #[tokio::test]
    async fn test_reporting_handler_reports_cancelled_dispatch() {
        let progress = HarnessProgress::new();
        let handler = ReportingHandler::new(
            Arc::new(
                MockHandler::new(HandlerType::Feedback).with_delay(Duration::from_millis(500)),
            ),
            progress.clone(),
        );
        let task = test_task("t-cancel", TaskType::Feedback);
        progress.track("t-cancel");

        let timed = tokio::time::timeout(Duration::from_millis(20), handler.process_task(&task)).await;
        assert!(timed.is_err());

        let run = &progress.results("t-cancel")[&HandlerType::Feedback];
        assert_eq!(run.success, Some(false));
        assert_eq!(
            run.result.as_ref().unwrap()["error"],
            json!(ABANDONED_REASON)
        );
    }
}
